//! Engine configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::EngineError;
use crate::gpu::compute::{ChunkLayout, KernelSource};
use crate::gpu::compute::buffers::TAPS_PER_GROUP;

/// Geometry and host-facing settings of an engine.
///
/// All lengths are in samples (or complex elements on the device).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bins per window; must be a power of two.
    pub spec_height: u32,
    /// Windows processed per call.
    pub segment_width: u32,
    /// Samples between consecutive windows.
    pub hop: u32,
    /// Rows of the packed host mask.
    pub host_mask_height: u32,
    /// Columns of the packed host mask.
    pub host_mask_width: u32,
    /// Longest signal the caller intends to stream, used for the whole-signal width.
    pub max_signal_size: u32,
    /// Sample rate of the signal, used by the frequency helpers only.
    pub sample_rate: u32,
    /// Rotate forward spectra so the zero-frequency bin sits in the middle row.
    pub center_bins: bool,
    /// Load `<kernel>.wgsl` from here instead of the embedded kernels.
    pub kernel_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            spec_height: 1024,
            segment_width: 32,
            hop: 128,
            host_mask_height: 1024,
            host_mask_width: 32,
            max_signal_size: 44100 * 60,
            sample_rate: 44100,
            center_bins: true,
            kernel_dir: None,
        }
    }
}

impl EngineConfig {
    /// Configuration from the four construction parameters; everything else defaults.
    pub fn new(host_mask_height: u32, host_mask_width: u32, hop: u32, spec_height: u32) -> Self {
        Self {
            host_mask_height,
            host_mask_width,
            hop,
            spec_height,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.spec_height.is_power_of_two() {
            return Err(EngineError::InvalidConfig(format!(
                "spec_height must be a power of two, got {}",
                self.spec_height
            )));
        }
        let nonzero = [
            ("segment_width", self.segment_width),
            ("hop", self.hop),
            ("host_mask_height", self.host_mask_height),
            ("host_mask_width", self.host_mask_width),
            ("sample_rate", self.sample_rate),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(EngineError::InvalidConfig(format!("{name} must be non-zero")));
            }
        }
        // Wider hops leave samples no window covers, which the inverse cannot restore.
        if self.hop > self.spec_height {
            return Err(EngineError::InvalidConfig(format!(
                "hop {} exceeds spec_height {}",
                self.hop, self.spec_height
            )));
        }
        Ok(())
    }

    pub fn chunk_layout(&self) -> ChunkLayout {
        ChunkLayout {
            spec_height: self.spec_height,
            segment_width: self.segment_width,
            hop: self.hop,
            host_mask_height: self.host_mask_height,
            host_mask_width: self.host_mask_width,
        }
    }

    pub fn kernel_source(&self) -> KernelSource {
        match &self.kernel_dir {
            Some(dir) => KernelSource::Directory(dir.clone()),
            None => KernelSource::Embedded,
        }
    }

    /// Samples returned by a filter update: `H + hop * W`.
    pub fn signal_len(&self) -> usize {
        self.chunk_layout().signal_len() as usize
    }

    /// Samples a filter update consumes: the signal plus `H / 2` of context on each side.
    pub fn input_len(&self) -> usize {
        self.hop as usize * self.segment_width as usize + 2 * self.spec_height as usize
    }

    pub fn extended_len(&self) -> usize {
        self.chunk_layout().extended_len() as usize
    }

    pub fn spectrum_len(&self) -> usize {
        self.spec_height as usize * self.segment_width as usize
    }

    pub fn mask_len(&self) -> usize {
        self.host_mask_height as usize * self.host_mask_width as usize
    }

    /// Samples spanned by the windows of one segment: `(W - 1) * hop + H`.
    pub fn covered_len(&self) -> usize {
        (self.segment_width as usize).saturating_sub(1) * self.hop as usize
            + self.spec_height as usize
    }

    /// Bins across the spectrogram of a whole `max_signal_size` signal.
    pub fn spectrogram_width(&self) -> u64 {
        u64::from(self.spec_height) * (u64::from(self.max_signal_size).div_ceil(u64::from(self.hop)) + 1)
    }

    pub fn reduction_groups(&self) -> u32 {
        (self.spec_height / TAPS_PER_GROUP).max(1)
    }

    pub fn stage_count(&self) -> u32 {
        self.spec_height.trailing_zeros()
    }

    pub fn bin_width(&self) -> f32 {
        self.sample_rate as f32 / self.spec_height as f32
    }

    /// Natural bin nearest a non-negative frequency.
    pub fn bin_for_frequency(&self, frequency: f32) -> usize {
        ((frequency / self.bin_width()).round() as usize).min(self.spec_height as usize - 1)
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::InvalidConfig(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }
}

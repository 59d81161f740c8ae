//! The spectral filter engine.
//!
//! [`SdftEngine`] owns a device context, the compiled kernels and one recorded
//! chunk. Every public operation replays pre-recorded passes; nothing is
//! recorded after construction.

pub mod config;
pub mod orchestrator;

pub use config::EngineConfig;

use std::path::PathBuf;

use wgpu::ShaderStages;

use crate::gpu::binding::{self, LayoutCache};
use crate::gpu::chunk::{Chunk, FenceId};
use crate::gpu::compute::params::PARAM_BLOCK_SIZE;
use crate::gpu::compute::{BufferId, ComputeError, KernelCatalog};
use crate::gpu::context::{ContextOptions, DeviceContext, GpuError};
use crate::gpu::queues::QueueRole;
use crate::gpu::sync::SyncError;
use crate::spectrogram::{overlap_average, ComplexSpectrogram, Spectrogram};
use orchestrator::{OneShotCopy, Orchestrator, FILTER_FLOW, FORWARD_FLOW, SYNTHESIS_FLOW};

/// Errors raised by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("device initialisation failed: {0}")]
    DeviceInit(#[from] GpuError),
    #[error("device resources exhausted: {0}")]
    ResourceExhaustion(String),
    #[error("failed to load {kernel} kernel from {}: {source}", path.display())]
    ShaderLoad {
        kernel: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{kernel} kernel failed to compile: {message}")]
    ShaderCompile { kernel: &'static str, message: String },
    #[error("failed to serialise configuration: {0}")]
    ConfigEncode(#[from] serde_json::Error),
    #[error("device operation failed: {0}")]
    DeviceOperation(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("signal has {got} samples, expected {needed}")]
    SignalLength { needed: usize, got: usize },
    #[error("mask has {got} pixels, expected {needed}")]
    MaskLength { needed: usize, got: usize },
    #[error("spectrum is {got_height}x{got_width}, expected {height}x{width}")]
    SpectrumShape {
        height: usize,
        width: usize,
        got_height: usize,
        got_width: usize,
    },
}

impl From<ComputeError> for EngineError {
    fn from(err: ComputeError) -> Self {
        match err {
            ComputeError::ShaderLoad {
                kernel,
                path,
                source,
            } => EngineError::ShaderLoad {
                kernel,
                path,
                source,
            },
            ComputeError::ShaderCompile { kernel, message } => {
                EngineError::ShaderCompile { kernel, message }
            }
            ComputeError::Limit { .. } | ComputeError::Binding(_) => {
                EngineError::ResourceExhaustion(err.to_string())
            }
            ComputeError::MissingBinding(_) | ComputeError::BufferMapFailed(_) => {
                EngineError::DeviceOperation(err.to_string())
            }
        }
    }
}

impl From<SyncError> for EngineError {
    fn from(err: SyncError) -> Self {
        EngineError::DeviceOperation(err.to_string())
    }
}

/// GPU sliding-DFT engine.
///
/// Fields are declared in release order: the chunk, the kernels, then the
/// context that owns the device.
pub struct SdftEngine {
    chunk: Chunk,
    catalog: KernelCatalog,
    context: DeviceContext,
    config: EngineConfig,
    poisoned: bool,
}

impl SdftEngine {
    /// Create a context and build an engine on it.
    pub async fn new(config: EngineConfig, options: &ContextOptions) -> Result<Self, EngineError> {
        config.validate()?;
        let context = DeviceContext::new(options).await?;
        Self::with_context(context, config)
    }

    /// Blocking constructor from the four geometry parameters.
    pub fn init(
        host_mask_height: u32,
        host_mask_width: u32,
        hop: u32,
        spec_height: u32,
    ) -> Result<Self, EngineError> {
        Self::blocking(
            EngineConfig::new(host_mask_height, host_mask_width, hop, spec_height),
            &ContextOptions::default(),
        )
    }

    /// Blocking variant of [`SdftEngine::new`].
    pub fn blocking(config: EngineConfig, options: &ContextOptions) -> Result<Self, EngineError> {
        pollster::block_on(Self::new(config, options))
    }

    /// Build an engine on an existing context.
    pub fn with_context(context: DeviceContext, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let device = &context.device;

        let mut storage_layouts = LayoutCache::new("chunk_storage", ShaderStages::COMPUTE);
        let resources = Chunk::allocate(device, config.chunk_layout(), &mut storage_layouts)?;
        let storage_layout = storage_layouts.layout().ok_or_else(|| {
            EngineError::ResourceExhaustion("chunk has no storage buffers".into())
        })?;

        let params_layout = binding::params_layout(device, PARAM_BLOCK_SIZE);
        let catalog = KernelCatalog::new(
            device,
            storage_layout,
            &params_layout,
            &config.kernel_source(),
        )?;
        let chunk = Chunk::record(device, resources, &params_layout, config.center_bins);

        log::info!(
            "SDFT engine ready: {} bins, {} windows, hop {}, mask {}x{}",
            config.spec_height,
            config.segment_width,
            config.hop,
            config.host_mask_height,
            config.host_mask_width
        );

        Ok(Self {
            chunk,
            catalog,
            context,
            config,
            poisoned: false,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    /// Bins across the spectrogram of a whole `max_signal_size` signal.
    pub fn spec_width(&self) -> u64 {
        self.config.spectrogram_width()
    }

    /// Whether an earlier device failure left the engine unusable.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Filter a segment through a packed time-frequency mask.
    ///
    /// `mask` holds `host_mask_height * host_mask_width` packed pixels in
    /// column-major order; the low byte of each is the gain. `signal_in` holds
    /// `hop * W + 2 * H` samples: the segment plus `H / 2` of context on each
    /// side. Returns `H + hop * W` filtered samples.
    pub fn update(&mut self, mask: &[u32], signal_in: &[f32]) -> Result<Vec<f32>, EngineError> {
        self.ensure_usable()?;
        if mask.len() != self.config.mask_len() {
            return Err(EngineError::MaskLength {
                needed: self.config.mask_len(),
                got: mask.len(),
            });
        }
        if signal_in.len() != self.config.input_len() {
            return Err(EngineError::SignalLength {
                needed: self.config.input_len(),
                got: signal_in.len(),
            });
        }
        let result = self.run_update(mask, signal_in);
        self.settle(result)
    }

    /// Magnitude spectrogram of up to `H + hop * W` samples.
    pub fn calc_sdft(&mut self, signal: &[f32]) -> Result<Spectrogram, EngineError> {
        Ok(self.calc_sdft_raw(signal)?.magnitudes())
    }

    /// Complex spectrogram of up to `H + hop * W` samples, zero-padded.
    pub fn calc_sdft_raw(&mut self, signal: &[f32]) -> Result<ComplexSpectrogram, EngineError> {
        self.ensure_usable()?;
        if signal.len() > self.config.signal_len() {
            return Err(EngineError::SignalLength {
                needed: self.config.signal_len(),
                got: signal.len(),
            });
        }
        let result = self.run_forward(signal);
        self.settle(result)
    }

    /// Resynthesise a signal from a spectrogram of this engine's geometry.
    ///
    /// Each window is inverse transformed and the overlapping windows are
    /// averaged, giving `(W - 1) * hop + H` samples.
    pub fn inverse_sdft(&mut self, spectrum: &ComplexSpectrogram) -> Result<Vec<f32>, EngineError> {
        self.ensure_usable()?;
        let height = self.config.spec_height as usize;
        let width = self.config.segment_width as usize;
        if spectrum.height() != height || spectrum.width() != width {
            return Err(EngineError::SpectrumShape {
                height,
                width,
                got_height: spectrum.height(),
                got_width: spectrum.width(),
            });
        }
        let result = self.run_synthesis(spectrum);
        self.settle(result)
    }

    /// Magnitudes of the filtered signal's spectrogram from the last [`SdftEngine::update`].
    pub fn filtered_spectrogram(&mut self) -> Result<Spectrogram, EngineError> {
        self.ensure_usable()?;
        let result = self.run_filtered_readback();
        self.settle(result)
    }

    /// Release the chunk, the kernels and then the device.
    pub fn destroy(self) {
        let SdftEngine {
            chunk,
            catalog,
            context,
            ..
        } = self;
        chunk.destroy();
        drop(catalog);
        context.destroy();
    }

    fn ensure_usable(&self) -> Result<(), EngineError> {
        if self.poisoned {
            return Err(EngineError::DeviceOperation(
                "engine is unusable after an earlier device failure".into(),
            ));
        }
        Ok(())
    }

    fn settle<T>(&mut self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        if let Err(EngineError::DeviceOperation(reason)) = &result {
            log::error!("Device operation failed, engine poisoned: {reason}");
            self.poisoned = true;
        }
        result
    }

    fn write_complex(&self, id: BufferId, samples: &[[f32; 2]]) {
        self.context
            .queue_for(QueueRole::Transfer)
            .write_buffer(&self.chunk.buffer(id).buffer, 0, bytemuck::cast_slice(samples));
    }

    fn read_spectrum(&self) -> Result<Vec<[f32; 2]>, EngineError> {
        Ok(self
            .chunk
            .buffer(BufferId::SpectrumReadback)
            .read_complex(&self.context.device, self.chunk.layout().spectrum_len())?)
    }

    fn run_update(&mut self, mask: &[u32], signal_in: &[f32]) -> Result<Vec<f32>, EngineError> {
        let layout = *self.chunk.layout();
        let half = u64::from(layout.spec_height / 2);

        self.write_complex(BufferId::Upload, &to_complex(signal_in));
        self.context.queue_for(QueueRole::Transfer).write_buffer(
            &self.chunk.buffer(BufferId::MaskHost).buffer,
            0,
            bytemuck::cast_slice(mask),
        );

        let orchestrator = Orchestrator::new(&self.context, &self.catalog);
        orchestrator.one_shot(
            &self.chunk,
            "upload_signal",
            &[
                OneShotCopy {
                    src: BufferId::Upload,
                    src_offset: half,
                    dst: BufferId::SignalRaw,
                    elements: layout.signal_len(),
                },
                OneShotCopy {
                    src: BufferId::Upload,
                    src_offset: 0,
                    dst: BufferId::SignalExt,
                    elements: signal_in.len() as u64,
                },
            ],
        )?;
        orchestrator.run(&mut self.chunk, &FILTER_FLOW, FenceId::Filter)?;
        orchestrator.one_shot(
            &self.chunk,
            "download_signal",
            &[OneShotCopy {
                src: BufferId::SignalFilt,
                src_offset: 0,
                dst: BufferId::SignalReadback,
                elements: layout.signal_len(),
            }],
        )?;

        let filtered = self
            .chunk
            .buffer(BufferId::SignalReadback)
            .read_complex(&self.context.device, layout.signal_len())?;
        Ok(filtered.into_iter().map(|[re, _]| re).collect())
    }

    fn run_forward(&mut self, signal: &[f32]) -> Result<ComplexSpectrogram, EngineError> {
        let mut samples = to_complex(signal);
        samples.resize(self.config.signal_len(), [0.0, 0.0]);
        self.write_complex(BufferId::Upload, &samples);

        Orchestrator::new(&self.context, &self.catalog).run(
            &mut self.chunk,
            &FORWARD_FLOW,
            FenceId::Sdft,
        )?;

        self.complex_spectrogram(self.read_spectrum()?, self.config.center_bins)
    }

    fn run_synthesis(&mut self, spectrum: &ComplexSpectrogram) -> Result<Vec<f32>, EngineError> {
        self.write_complex(BufferId::SpecRaw, spectrum.uncentered().data());

        Orchestrator::new(&self.context, &self.catalog).run(
            &mut self.chunk,
            &SYNTHESIS_FLOW,
            FenceId::Sdft,
        )?;

        let windows = self.read_spectrum()?;
        Ok(overlap_average(
            &windows,
            self.config.spec_height as usize,
            self.config.hop as usize,
            self.config.covered_len(),
        ))
    }

    fn run_filtered_readback(&mut self) -> Result<Spectrogram, EngineError> {
        Orchestrator::new(&self.context, &self.catalog).one_shot(
            &self.chunk,
            "download_filtered_spectrum",
            &[OneShotCopy {
                src: BufferId::SpecFilt,
                src_offset: 0,
                dst: BufferId::SpectrumReadback,
                elements: self.chunk.layout().spectrum_len(),
            }],
        )?;
        Ok(self
            .complex_spectrogram(self.read_spectrum()?, self.config.center_bins)?
            .magnitudes())
    }

    fn complex_spectrogram(
        &self,
        data: Vec<[f32; 2]>,
        centered: bool,
    ) -> Result<ComplexSpectrogram, EngineError> {
        let height = self.config.spec_height as usize;
        let width = self.config.segment_width as usize;
        let got = data.len();
        ComplexSpectrogram::new(height, width, centered, data).ok_or_else(|| {
            EngineError::DeviceOperation(format!(
                "readback returned {got} bins for a {height}x{width} spectrogram"
            ))
        })
    }
}

fn to_complex(samples: &[f32]) -> Vec<[f32; 2]> {
    samples.iter().map(|&s| [s, 0.0]).collect()
}

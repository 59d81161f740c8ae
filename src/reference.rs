//! Host reference for the device transform and filter, built on RustFFT.
//!
//! Every operation mirrors the engine's geometry and indexing so results can be
//! compared bin for bin and sample for sample.

use rustfft::{num_complex::Complex, FftPlanner};

use crate::engine::EngineConfig;
use crate::mask::Mask;
use crate::spectrogram::{display_row, overlap_average, ComplexSpectrogram};

pub struct ReferenceSdft {
    planner: FftPlanner<f32>,
    spec_height: usize,
    segment_width: usize,
    hop: usize,
    center_bins: bool,
}

impl ReferenceSdft {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            planner: FftPlanner::new(),
            spec_height: config.spec_height as usize,
            segment_width: config.segment_width as usize,
            hop: config.hop as usize,
            center_bins: config.center_bins,
        }
    }

    /// Samples a forward transform covers: `H + hop * W`.
    pub fn signal_len(&self) -> usize {
        self.spec_height + self.hop * self.segment_width
    }

    /// Windowed forward transform of `signal`, zero-padded to [`ReferenceSdft::signal_len`].
    pub fn forward(&mut self, signal: &[f32]) -> ComplexSpectrogram {
        let height = self.spec_height;
        let fft = self.planner.plan_fft_forward(height);
        let mut spectrum = ComplexSpectrogram::zeros(height, self.segment_width, self.center_bins);

        for t in 0..self.segment_width {
            let start = t * self.hop;
            let mut buffer: Vec<Complex<f32>> = (start..start + height)
                .map(|i| Complex::new(signal.get(i).copied().unwrap_or(0.0), 0.0))
                .collect();
            fft.process(&mut buffer);

            let column = spectrum.column_mut(t);
            for (bin, c) in buffer.iter().enumerate() {
                column[display_row(bin, height, self.center_bins)] = [c.re, c.im];
            }
        }
        spectrum
    }

    /// Inverse transform of each window, averaged over the overlaps.
    pub fn inverse(&mut self, spectrum: &ComplexSpectrogram) -> Vec<f32> {
        let height = spectrum.height();
        let natural = spectrum.uncentered();
        let mut windows = Vec::with_capacity(natural.data().len());
        for t in 0..natural.width() {
            windows.extend(self.inverse_column(natural.column(t)));
        }
        let covered = natural.width().saturating_sub(1) * self.hop + height;
        overlap_average(&windows, height, self.hop, covered)
    }

    /// Filter taps derived from a mask: one column of `H` taps per window, centred on tap `H / 2`.
    pub fn filter_taps(&mut self, mask: &Mask) -> Vec<[f32; 2]> {
        let height = self.spec_height;
        let gains = mask.resized(height, self.segment_width);
        let mut taps = vec![[0.0f32; 2]; height * self.segment_width];

        for (t, column) in gains.chunks_exact(height).enumerate() {
            let spectrum: Vec<[f32; 2]> = column.iter().map(|&g| [g, 0.0]).collect();
            let impulse = self.inverse_column(&spectrum);
            let out = &mut taps[t * height..(t + 1) * height];
            for (n, value) in impulse.into_iter().enumerate() {
                out[display_row(n, height, true)] = value;
            }
        }
        taps
    }

    /// Apply a mask to a segment with `H / 2` samples of context on each side.
    ///
    /// Returns `H + hop * W` samples.
    pub fn filter(&mut self, mask: &Mask, signal_in: &[f32]) -> Vec<f32> {
        let height = self.spec_height;
        let taps = self.filter_taps(mask);
        let origin_shift = 2 * (height / 2);

        (0..self.signal_len())
            .map(|m| {
                let column = &taps[self.tap_column(m) * height..][..height];
                // The signal is real, so only the taps' real parts reach the output.
                column
                    .iter()
                    .enumerate()
                    .map(|(n, tap)| tap[0] * signal_in.get(m + origin_shift - n).copied().unwrap_or(0.0))
                    .sum()
            })
            .collect()
    }

    /// Window whose filter applies at output sample `m`.
    pub fn tap_column(&self, m: usize) -> usize {
        let offset = m as i64 - (self.spec_height / 2) as i64 + (self.hop / 2) as i64;
        let column = if offset > 0 {
            offset as usize / self.hop
        } else {
            0
        };
        column.min(self.segment_width.max(1) - 1)
    }

    fn inverse_column(&mut self, column: &[[f32; 2]]) -> Vec<[f32; 2]> {
        let height = column.len();
        let ifft = self.planner.plan_fft_inverse(height);
        let mut buffer: Vec<Complex<f32>> =
            column.iter().map(|&[re, im]| Complex::new(re, im)).collect();
        ifft.process(&mut buffer);
        let scale = 1.0 / height as f32;
        buffer.iter().map(|c| [c.re * scale, c.im * scale]).collect()
    }
}

/// Level in dB (re. full scale) of the component at `frequency`, by direct DFT.
pub fn tone_level_db(signal: &[f32], frequency: f32, sample_rate: u32) -> f32 {
    if signal.is_empty() {
        return f32::NEG_INFINITY;
    }
    let omega = 2.0 * std::f64::consts::PI * f64::from(frequency) / f64::from(sample_rate);
    let (re, im) = signal
        .iter()
        .enumerate()
        .fold((0.0f64, 0.0f64), |(re, im), (n, &x)| {
            let phase = omega * n as f64;
            (re + f64::from(x) * phase.cos(), im - f64::from(x) * phase.sin())
        });
    let amplitude = 2.0 * re.hypot(im) / signal.len() as f64;
    (20.0 * amplitude.max(1e-12).log10()) as f32
}

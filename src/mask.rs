//! Host-resolution time-frequency masks.
//!
//! A mask is column-major: column `c` is one time slice and holds `rows`
//! packed pixels, row 0 being the zero-frequency bin. Each pixel is an opaque
//! ARGB `u32`; the filter only reads its low byte, scaled to a gain in `0..=1`.

use crate::spectrogram::bin_frequency;

/// Pack a gain as an opaque grey pixel.
pub fn pack_gain(gain: f32) -> u32 {
    let g = (gain.clamp(0.0, 1.0) * 255.0).round() as u32;
    0xFF00_0000 | (g << 16) | (g << 8) | g
}

/// Gain encoded in the low byte of a packed pixel.
pub fn unpack_gain(pixel: u32) -> f32 {
    (pixel & 0xFF) as f32 / 255.0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    rows: usize,
    cols: usize,
    pixels: Vec<u32>,
}

impl Mask {
    /// Wrap packed pixels. Returns `None` when the length is not `rows * cols`.
    pub fn new(rows: usize, cols: usize, pixels: Vec<u32>) -> Option<Self> {
        (pixels.len() == rows * cols).then_some(Self { rows, cols, pixels })
    }

    pub fn filled(rows: usize, cols: usize, gain: f32) -> Self {
        Self {
            rows,
            cols,
            pixels: vec![pack_gain(gain); rows * cols],
        }
    }

    /// Unity gain everywhere.
    pub fn pass_through(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 1.0)
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    /// Gain from a function of `(row, col)`.
    pub fn from_fn(rows: usize, cols: usize, mut gain: impl FnMut(usize, usize) -> f32) -> Self {
        let mut pixels = Vec::with_capacity(rows * cols);
        for col in 0..cols {
            pixels.extend((0..rows).map(|row| pack_gain(gain(row, col))));
        }
        Self { rows, cols, pixels }
    }

    /// Unity gain where `low_hz <= |f| <= high_hz`, zero elsewhere.
    ///
    /// Row `r` stands for the signed frequency of bin `r` in a `rows`-bin
    /// transform at `sample_rate`.
    pub fn band_pass(rows: usize, cols: usize, sample_rate: u32, low_hz: f32, high_hz: f32) -> Self {
        Self::from_fn(rows, cols, |row, _| {
            let f = bin_frequency(row, rows, sample_rate).abs();
            if f >= low_hz && f <= high_hz {
                1.0
            } else {
                0.0
            }
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn gain(&self, row: usize, col: usize) -> f32 {
        unpack_gain(self.pixels[col * self.rows + row])
    }

    /// Bilinear resample of the gains to `rows x cols`, column-major.
    ///
    /// Pixel centres are aligned and coordinates clamp at the edges, the same
    /// mapping the device resize kernel uses.
    pub fn resized(&self, rows: usize, cols: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(rows * cols);
        for col in 0..cols {
            let x = source_coord(col, cols, self.cols);
            let c0 = x.floor() as usize;
            let c1 = (c0 + 1).min(self.cols - 1);
            let wx = x - c0 as f32;
            for row in 0..rows {
                let y = source_coord(row, rows, self.rows);
                let r0 = y.floor() as usize;
                let r1 = (r0 + 1).min(self.rows - 1);
                let wy = y - r0 as f32;

                let top = lerp(self.gain(r0, c0), self.gain(r0, c1), wx);
                let bottom = lerp(self.gain(r1, c0), self.gain(r1, c1), wx);
                out.push(lerp(top, bottom, wy));
            }
        }
        out
    }
}

fn source_coord(dst_index: usize, dst_len: usize, src_len: usize) -> f32 {
    let scaled = (dst_index as f32 + 0.5) * src_len as f32 / dst_len as f32 - 0.5;
    scaled.clamp(0.0, (src_len - 1) as f32)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

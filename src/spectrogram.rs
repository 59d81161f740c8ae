//! Host-side spectrogram containers.
//!
//! Both containers are column-major: window `t` occupies the `height`
//! consecutive values starting at `t * height`. A centered spectrogram has
//! its bins rotated by `height / 2` so the zero-frequency bin sits in the
//! middle row.

/// Magnitude spectrogram.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    height: usize,
    width: usize,
    centered: bool,
    data: Vec<f32>,
}

/// Complex spectrogram, one `[re, im]` pair per bin and window.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexSpectrogram {
    height: usize,
    width: usize,
    centered: bool,
    data: Vec<[f32; 2]>,
}

/// Natural bin index of a display row.
pub fn natural_bin(row: usize, height: usize, centered: bool) -> usize {
    if centered {
        (row + height - height / 2) % height
    } else {
        row
    }
}

/// Display row of a natural bin index.
pub fn display_row(bin: usize, height: usize, centered: bool) -> usize {
    if centered {
        (bin + height / 2) % height
    } else {
        bin
    }
}

/// Signed frequency in Hz of a natural bin: bins above `height / 2` are negative.
pub fn bin_frequency(bin: usize, height: usize, sample_rate: u32) -> f32 {
    let signed = if bin > height / 2 {
        bin as f32 - height as f32
    } else {
        bin as f32
    };
    signed * sample_rate as f32 / height as f32
}

/// Average overlapping time-domain windows laid out `hop` apart into `len` samples.
///
/// Only the real part of each window is used. Samples no window covers are zero.
pub fn overlap_average(windows: &[[f32; 2]], height: usize, hop: usize, len: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; len];
    let mut count = vec![0u32; len];
    for (t, window) in windows.chunks_exact(height).enumerate() {
        let start = t * hop;
        for (i, &[re, _]) in window.iter().enumerate() {
            if let Some(slot) = sum.get_mut(start + i) {
                *slot += re;
                count[start + i] += 1;
            }
        }
    }
    sum.iter()
        .zip(&count)
        .map(|(&s, &n)| if n == 0 { 0.0 } else { s / n as f32 })
        .collect()
}

impl Spectrogram {
    /// Build from column-major magnitudes. Returns `None` when the length is not `height * width`.
    pub fn new(height: usize, width: usize, centered: bool, data: Vec<f32>) -> Option<Self> {
        (data.len() == height * width).then_some(Self {
            height,
            width,
            centered,
            data,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_centered(&self) -> bool {
        self.centered
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn column(&self, t: usize) -> &[f32] {
        &self.data[t * self.height..(t + 1) * self.height]
    }

    pub fn get(&self, row: usize, t: usize) -> f32 {
        self.data[t * self.height + row]
    }

    /// Row with the largest magnitude in window `t`; the first one wins ties.
    pub fn dominant_row(&self, t: usize) -> Option<usize> {
        if t >= self.width {
            return None;
        }
        self.column(t)
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (row, &m)| match best {
                Some((_, b)) if b >= m => best,
                _ => Some((row, m)),
            })
            .map(|(row, _)| row)
    }

    /// Signed frequency in Hz represented by a row.
    pub fn row_frequency(&self, row: usize, sample_rate: u32) -> f32 {
        bin_frequency(
            natural_bin(row, self.height, self.centered),
            self.height,
            sample_rate,
        )
    }

    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(0.0, f32::max)
    }

    /// Grey levels in row-major order, `height` rows of `width` pixels.
    ///
    /// Magnitudes are normalised to the maximum and mapped from `floor_db`..0 dB
    /// onto 0..255.
    pub fn to_gray_pixels(&self, floor_db: f32) -> Vec<u8> {
        let max = self.max();
        let floor_db = floor_db.min(-f32::EPSILON);
        let mut pixels = vec![0u8; self.height * self.width];
        if max <= 0.0 {
            return pixels;
        }
        for t in 0..self.width {
            for row in 0..self.height {
                let db = 20.0 * (self.get(row, t) / max).max(1e-12).log10();
                let level = (1.0 - db / floor_db).clamp(0.0, 1.0);
                pixels[row * self.width + t] = (level * 255.0).round() as u8;
            }
        }
        pixels
    }

    /// Render as a greyscale image, one pixel per bin and window.
    pub fn to_image(&self, floor_db: f32) -> Option<image::GrayImage> {
        image::GrayImage::from_raw(
            self.width as u32,
            self.height as u32,
            self.to_gray_pixels(floor_db),
        )
    }
}

impl ComplexSpectrogram {
    /// Build from column-major bins. Returns `None` when the length is not `height * width`.
    pub fn new(height: usize, width: usize, centered: bool, data: Vec<[f32; 2]>) -> Option<Self> {
        (data.len() == height * width).then_some(Self {
            height,
            width,
            centered,
            data,
        })
    }

    pub fn zeros(height: usize, width: usize, centered: bool) -> Self {
        Self {
            height,
            width,
            centered,
            data: vec![[0.0; 2]; height * width],
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_centered(&self) -> bool {
        self.centered
    }

    pub fn data(&self) -> &[[f32; 2]] {
        &self.data
    }

    pub fn column(&self, t: usize) -> &[[f32; 2]] {
        &self.data[t * self.height..(t + 1) * self.height]
    }

    pub fn column_mut(&mut self, t: usize) -> &mut [[f32; 2]] {
        &mut self.data[t * self.height..(t + 1) * self.height]
    }

    pub fn magnitudes(&self) -> Spectrogram {
        Spectrogram {
            height: self.height,
            width: self.width,
            centered: self.centered,
            data: self.data.iter().map(|[re, im]| re.hypot(*im)).collect(),
        }
    }

    /// Same bins in natural order.
    pub fn uncentered(&self) -> ComplexSpectrogram {
        if !self.centered {
            return self.clone();
        }
        let mut data = Vec::with_capacity(self.data.len());
        for t in 0..self.width {
            let column = self.column(t);
            data.extend((0..self.height).map(|bin| column[display_row(bin, self.height, true)]));
        }
        ComplexSpectrogram {
            height: self.height,
            width: self.width,
            centered: false,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_bin_mapping_round_trips() {
        for height in [1, 2, 8, 1024] {
            for bin in 0..height {
                let row = display_row(bin, height, true);
                assert_eq!(natural_bin(row, height, true), bin);
            }
        }
    }

    #[test]
    fn test_centered_rows_are_signed_frequencies() {
        let spec = Spectrogram::new(8, 1, true, vec![0.0; 8]).unwrap();
        assert_eq!(spec.row_frequency(4, 800), 0.0);
        assert_eq!(spec.row_frequency(5, 800), 100.0);
        assert_eq!(spec.row_frequency(3, 800), -100.0);
        assert_eq!(spec.row_frequency(0, 800), 400.0);
    }

    #[test]
    fn test_dominant_row_first_wins() {
        let spec = Spectrogram::new(4, 2, false, vec![0.0, 3.0, 1.0, 3.0, 5.0, 0.0, 0.0, 0.0])
            .unwrap();
        assert_eq!(spec.dominant_row(0), Some(1));
        assert_eq!(spec.dominant_row(1), Some(0));
        assert_eq!(spec.dominant_row(2), None);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        assert!(Spectrogram::new(4, 2, false, vec![0.0; 7]).is_none());
        assert!(ComplexSpectrogram::new(4, 2, false, vec![[0.0; 2]; 9]).is_none());
    }

    #[test]
    fn test_uncentered_moves_dc_to_row_zero() {
        let mut data = vec![[0.0, 0.0]; 4];
        data[2] = [1.0, 0.0];
        let spec = ComplexSpectrogram::new(4, 1, true, data).unwrap();
        let natural = spec.uncentered();
        assert!(!natural.is_centered());
        assert_eq!(natural.data()[0], [1.0, 0.0]);
    }

    #[test]
    fn test_magnitudes() {
        let spec = ComplexSpectrogram::new(1, 2, false, vec![[3.0, 4.0], [0.0, -2.0]]).unwrap();
        assert_eq!(spec.magnitudes().data(), &[5.0, 2.0]);
    }

    #[test]
    fn test_gray_pixels_row_major() {
        let spec = Spectrogram::new(2, 2, false, vec![1.0, 0.0, 0.0, 0.5]).unwrap();
        let pixels = spec.to_gray_pixels(-60.0);
        // Row 0: (t0, t1) = (1.0, 0.0); row 1: (0.0, 0.5).
        assert_eq!(pixels[0], 255);
        assert_eq!(pixels[1], 0);
        assert_eq!(pixels[2], 0);
        assert!(pixels[3] > 200 && pixels[3] < 255);

        let image = spec.to_image(-60.0).unwrap();
        assert_eq!(image.dimensions(), (2, 2));
    }

    #[test]
    fn test_overlap_average_recovers_consistent_windows() {
        let signal: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let (height, hop) = (4, 2);
        let mut windows = Vec::new();
        for t in 0..4 {
            windows.extend(signal[t * hop..t * hop + height].iter().map(|&s| [s, 0.0]));
        }
        let out = overlap_average(&windows, height, hop, 3 * hop + height);
        assert_eq!(out, signal);
    }

    #[test]
    fn test_overlap_average_averages_disagreement() {
        let windows = [[1.0, 0.0], [1.0, 0.0], [3.0, 0.0], [3.0, 0.0]];
        let out = overlap_average(&windows, 2, 1, 3);
        assert_eq!(out, vec![1.0, 2.0, 3.0]);
    }
}

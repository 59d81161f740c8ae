//! Synthetic signal generation for tests and benches.

use std::f32::consts::PI;

/// Generate a sine wave.
///
/// # Arguments
/// * `frequency` - Frequency in Hz
/// * `sample_rate` - Sample rate in Hz
/// * `num_samples` - Length of the output
/// * `amplitude` - Peak amplitude
pub fn generate_sine(frequency: f32, sample_rate: u32, num_samples: usize, amplitude: f32) -> Vec<f32> {
    generate_tones(&[(frequency, amplitude)], sample_rate, num_samples)
}

/// Sum of sines, each given as `(frequency, amplitude)`.
pub fn generate_tones(tones: &[(f32, f32)], sample_rate: u32, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| {
            // Reduce the phase per tone in f64 so long signals keep their accuracy.
            let t = i as f64 / f64::from(sample_rate);
            tones
                .iter()
                .map(|&(frequency, amplitude)| {
                    let phase = (f64::from(frequency) * t).fract() as f32;
                    amplitude * (2.0 * PI * phase).sin()
                })
                .sum()
        })
        .collect()
}

/// Generate white noise in `-amplitude..amplitude`.
///
/// Uses a simple linear congruential generator for reproducibility.
pub fn generate_white_noise(num_samples: usize, amplitude: f32, seed: u64) -> Vec<f32> {
    let mut state = seed;
    let a: u64 = 6364136223846793005;
    let c: u64 = 1442695040888963407;

    (0..num_samples)
        .map(|_| {
            state = state.wrapping_mul(a).wrapping_add(c);
            let normalized = (state >> 40) as f32 / (1u64 << 24) as f32 * 2.0 - 1.0;
            amplitude * normalized
        })
        .collect()
}

/// A single unit sample at `position`.
pub fn generate_impulse(num_samples: usize, position: usize) -> Vec<f32> {
    let mut samples = vec![0.0; num_samples];
    if let Some(sample) = samples.get_mut(position) {
        *sample = 1.0;
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_sine() {
        let samples = generate_sine(440.0, 44100, 44100, 0.5);
        assert_eq!(samples.len(), 44100);

        // Check amplitude
        let max = samples.iter().cloned().fold(0.0f32, f32::max);
        assert!((max - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_generate_tones_sums() {
        let a = generate_sine(200.0, 16000, 256, 0.5);
        let b = generate_sine(2000.0, 16000, 256, 0.25);
        let both = generate_tones(&[(200.0, 0.5), (2000.0, 0.25)], 16000, 256);
        for i in 0..256 {
            assert!((both[i] - a[i] - b[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_generate_white_noise() {
        let samples = generate_white_noise(44100, 1.0, 12345);
        assert_eq!(samples.len(), 44100);

        // Should have both positive and negative values
        let has_positive = samples.iter().any(|&s| s > 0.0);
        let has_negative = samples.iter().any(|&s| s < 0.0);
        assert!(has_positive && has_negative);
        assert!(samples.iter().all(|s| s.abs() <= 1.0));

        assert_eq!(samples, generate_white_noise(44100, 1.0, 12345));
    }

    #[test]
    fn test_generate_impulse() {
        let samples = generate_impulse(8, 3);
        assert_eq!(samples.iter().sum::<f32>(), 1.0);
        assert_eq!(samples[3], 1.0);
        assert_eq!(generate_impulse(4, 9), vec![0.0; 4]);
    }
}

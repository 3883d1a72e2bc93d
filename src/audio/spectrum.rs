//! Windowed FFT with analyser-node style smoothing, plus the sample ring
//! the capture callback writes into.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

use crate::params::analyser_constants::{MIN_DECIBELS, SMOOTHING_TIME_CONSTANT};

/// Circular buffer of mono samples
pub struct SampleRing {
    samples: Vec<f32>,
    write_pos: usize,
    capacity: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: vec![0.0; capacity],
            write_pos: 0,
            capacity,
        }
    }

    pub fn push_samples(&mut self, data: &[f32]) {
        for &sample in data {
            self.samples[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.capacity;
        }
    }

    /// Copy the most recent `out.len()` samples into `out`, oldest first.
    ///
    /// Slots never written read as zero.
    pub fn copy_latest(&self, out: &mut [f32]) {
        let count = out.len().min(self.capacity);
        let start = (self.write_pos + self.capacity - count) % self.capacity;
        let skip = out.len() - count;

        out[..skip].fill(0.0);
        for (i, slot) in out[skip..].iter_mut().enumerate() {
            *slot = self.samples[(start + i) % self.capacity];
        }
    }
}

/// FFT analyser producing smoothed per-bin decibel magnitudes
pub struct AnalyserSpectrum {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    buffer: Vec<Complex<f32>>,
    /// Linear magnitudes carried between frames
    smoothed: Vec<f32>,
}

impl AnalyserSpectrum {
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        Self {
            fft,
            fft_size,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; fft_size / 2],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Transform `samples` and write `bin_count` decibel values into `out_db`.
    ///
    /// Missing samples are zero-padded; magnitudes are floored at
    /// `MIN_DECIBELS` so silence never yields `-inf`.
    pub fn process(&mut self, samples: &[f32], out_db: &mut [f32]) {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = samples.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * hann_window(i, self.fft_size), 0.0);
        }

        self.fft.process(&mut self.buffer);

        let scale = 1.0 / self.fft_size as f32;
        for (k, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.buffer[k].norm() * scale;
            *smoothed = SMOOTHING_TIME_CONSTANT * *smoothed
                + (1.0 - SMOOTHING_TIME_CONSTANT) * magnitude;

            if let Some(out) = out_db.get_mut(k) {
                *out = (20.0 * smoothed.log10()).max(MIN_DECIBELS);
            }
        }
    }
}

/// Hann window function for FFT analysis
fn hann_window(index: usize, size: usize) -> f32 {
    if size < 2 {
        return 1.0;
    }
    0.5 * (1.0 - ((2.0 * PI * index as f32) / (size as f32 - 1.0)).cos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_window() {
        let size = 1024;

        // Hann window should be 0 at edges, 1 at center
        assert!((hann_window(0, size) - 0.0).abs() < 0.01);
        assert!((hann_window(size - 1, size) - 0.0).abs() < 0.01);
        assert!((hann_window(size / 2, size) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_ring_returns_recent_samples_in_order() {
        let mut ring = SampleRing::new(8);
        ring.push_samples(&[1.0, 2.0, 3.0, 4.0]);

        let mut out = [0.0; 3];
        ring.copy_latest(&mut out);
        assert_eq!(out, [2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_ring_wraps_and_preserves_order() {
        let mut ring = SampleRing::new(5);
        ring.push_samples(&[1.0, 2.0, 3.0]);
        ring.push_samples(&[4.0, 5.0, 6.0, 7.0]);

        let mut out = [0.0; 5];
        ring.copy_latest(&mut out);
        assert_eq!(out, [3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_ring_zero_fills_oversized_request() {
        let mut ring = SampleRing::new(2);
        ring.push_samples(&[1.0, 2.0]);

        let mut out = [9.0; 4];
        ring.copy_latest(&mut out);
        assert_eq!(out, [0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_silence_floors_at_min_decibels() {
        let mut analyser = AnalyserSpectrum::new(512);
        let mut out = vec![0.0; analyser.bin_count()];
        analyser.process(&[0.0; 512], &mut out);
        assert!(out.iter().all(|&db| db == MIN_DECIBELS));
    }

    #[test]
    fn test_sine_peaks_at_expected_bin() {
        let sample_rate = 48_000.0;
        let size = 2048;
        // 48000 / 2048 = 23.4375 Hz per FFT bin; 1500 Hz lands on bin 64
        let freq = 1500.0;
        let samples: Vec<f32> = (0..size)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect();

        let mut analyser = AnalyserSpectrum::new(size);
        let mut out = vec![0.0; analyser.bin_count()];
        analyser.process(&samples, &mut out);

        let peak = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(64));
    }

    #[test]
    fn test_smoothing_carries_between_frames() {
        let size = 512;
        let samples: Vec<f32> = (0..size)
            .map(|i| (2.0 * PI * 16.0 * i as f32 / size as f32).sin())
            .collect();

        let mut analyser = AnalyserSpectrum::new(size);
        let mut first = vec![0.0; analyser.bin_count()];
        let mut second = vec![0.0; analyser.bin_count()];
        analyser.process(&samples, &mut first);
        analyser.process(&samples, &mut second);

        // Same input twice: the smoothed level keeps rising toward steady state
        assert!(second[16] > first[16]);
    }
}

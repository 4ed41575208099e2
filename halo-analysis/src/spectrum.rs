//! FFT analyser with byte-quantised magnitude output
//!
//! Behaves like a browser-style analyser node: Blackman window, per-bin
//! temporal smoothing, magnitudes mapped from a dB range onto 0..=255.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::{AnalysisError, MonitoringTap};

/// Window length of the shared output-bus analyser
pub const BUS_FFT_SIZE: usize = 2048;

/// Window length of the per-stream voice analyser
pub const VOICE_FFT_SIZE: usize = 512;

/// Real-time FFT analyser fed with mono samples
pub struct SpectrumAnalyzer {
    sample_rate: u32,
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Circular history of the last `fft_size` samples
    history: Vec<f32>,
    write_pos: usize,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
    smoothed: Vec<f32>,
    /// Pre-allocated FFT buffer to avoid allocation in analyze()
    fft_buffer: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    /// Create an analyser with the default smoothing (0.8) and dB range (-100..-30)
    pub fn new(sample_rate: u32, fft_size: usize) -> Result<Self, AnalysisError> {
        if !fft_size.is_power_of_two() || !(32..=32768).contains(&fft_size) {
            return Err(AnalysisError::InvalidFftSize(fft_size));
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Pre-compute Blackman window
        let n = fft_size as f32;
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let x = i as f32 / n;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();

        Ok(Self {
            sample_rate,
            fft_size,
            fft,
            window,
            history: vec![0.0; fft_size],
            write_pos: 0,
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
            smoothed: vec![0.0; fft_size / 2],
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
        })
    }

    /// Analyser configured the way the output bus monitor uses it
    pub fn bus_monitor(sample_rate: u32) -> Result<Self, AnalysisError> {
        let mut analyzer = Self::new(sample_rate, BUS_FFT_SIZE)?;
        analyzer.set_smoothing(0.85);
        analyzer.set_db_range(-90.0, -25.0);
        Ok(analyzer)
    }

    /// Set temporal smoothing (0.0 - 1.0)
    pub fn set_smoothing(&mut self, smoothing: f32) {
        self.smoothing = smoothing.clamp(0.0, 1.0);
    }

    /// Set the dB range mapped onto 0..=255
    pub fn set_db_range(&mut self, min_db: f32, max_db: f32) {
        if max_db > min_db {
            self.min_db = min_db;
            self.max_db = max_db;
        }
    }

    /// Append mono samples to the analysis history
    pub fn push(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.history[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.fft_size;
        }
    }

    /// Append interleaved samples, averaging all channels down to mono
    pub fn push_interleaved(&mut self, samples: &[f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let scale = 1.0 / channels as f32;
        for frame in samples.chunks_exact(channels) {
            let mono = frame.iter().sum::<f32>() * scale;
            self.history[self.write_pos] = mono;
            self.write_pos = (self.write_pos + 1) % self.fft_size;
        }
    }

    /// Clear history and smoothing state
    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.smoothed.fill(0.0);
        self.write_pos = 0;
    }

    /// Run the FFT over the current history and update smoothed magnitudes
    fn analyze(&mut self) {
        // Oldest sample sits at write_pos
        for i in 0..self.fft_size {
            let sample = self.history[(self.write_pos + i) % self.fft_size];
            self.fft_buffer[i] = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.fft_buffer);

        let norm = 1.0 / self.fft_size as f32;
        for (prev, bin) in self.smoothed.iter_mut().zip(self.fft_buffer.iter()) {
            let magnitude = bin.norm() * norm;
            *prev = self.smoothing * *prev + (1.0 - self.smoothing) * magnitude;
        }
    }

    #[inline]
    fn quantize(&self, magnitude: f32) -> u8 {
        if magnitude <= 0.0 {
            return 0;
        }
        let db = 20.0 * magnitude.log10();
        let scaled = 255.0 / (self.max_db - self.min_db) * (db - self.min_db);
        scaled.clamp(0.0, 255.0) as u8
    }
}

impl MonitoringTap for SpectrumAnalyzer {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn fft_size(&self) -> usize {
        self.fft_size
    }

    fn byte_frequency_data(&mut self, out: &mut [u8]) -> Result<(), AnalysisError> {
        self.analyze();
        for (dst, &magnitude) in out.iter_mut().zip(self.smoothed.iter()) {
            *dst = self.quantize(magnitude);
        }
        Ok(())
    }

    fn float_time_domain_data(&mut self, out: &mut [f32]) -> Result<(), AnalysisError> {
        let n = out.len().min(self.fft_size);
        // Most recent n samples, oldest first
        let start = (self.write_pos + self.fft_size - n) % self.fft_size;
        for (i, dst) in out.iter_mut().take(n).enumerate() {
            *dst = self.history[(start + i) % self.fft_size];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_rejects_invalid_fft_size() {
        assert!(matches!(
            SpectrumAnalyzer::new(48000, 1000),
            Err(AnalysisError::InvalidFftSize(1000))
        ));
        assert!(SpectrumAnalyzer::new(48000, 16).is_err());
    }

    #[test]
    fn test_silence_is_zero() {
        let mut analyzer = SpectrumAnalyzer::bus_monitor(48000).unwrap();
        analyzer.push(&vec![0.0; 4096]);

        let mut bins = vec![0u8; analyzer.frequency_bin_count()];
        analyzer.byte_frequency_data(&mut bins).unwrap();
        assert!(bins.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tone_peaks_at_expected_bin() {
        let mut analyzer = SpectrumAnalyzer::new(48000, 2048).unwrap();
        analyzer.set_smoothing(0.0);
        analyzer.push(&sine(1000.0, 48000, 2048));

        let mut bins = vec![0u8; 1024];
        analyzer.byte_frequency_data(&mut bins).unwrap();

        let peak = bins
            .iter()
            .enumerate()
            .max_by_key(|(_, &b)| b)
            .map(|(i, _)| i)
            .unwrap();
        // 1000 Hz / (48000 / 2048) = 42.7
        assert!((42..=43).contains(&peak), "peak at bin {}", peak);
        assert!(bins[peak] > 200);
        assert!(bins[400] < bins[peak] / 2);
    }

    #[test]
    fn test_time_domain_returns_latest_samples() {
        let mut analyzer = SpectrumAnalyzer::new(48000, 32).unwrap();
        let ramp: Vec<f32> = (0..40).map(|i| i as f32).collect();
        analyzer.push(&ramp);

        let mut out = vec![0.0; 32];
        analyzer.float_time_domain_data(&mut out).unwrap();
        assert_eq!(out[0], 8.0);
        assert_eq!(out[31], 39.0);
    }

    #[test]
    fn test_push_interleaved_averages_channels() {
        let mut analyzer = SpectrumAnalyzer::new(48000, 32).unwrap();
        analyzer.push_interleaved(&[1.0, 0.0, 0.5, 0.5], 2);

        let mut out = vec![0.0; 2];
        analyzer.float_time_domain_data(&mut out).unwrap();
        assert_eq!(out, vec![0.5, 0.5]);
    }
}

//! Band-energy features extracted from monitoring tap snapshots

use crate::{AnalysisError, MonitoringTap};

/// Mean of `data[start..=end]`.
///
/// Both bounds are clamped into the slice and swapped if reversed, so callers
/// can pass bin ranges computed for a larger spectrum. Empty input yields 0.
pub fn avg_range(data: &[u8], start: usize, end: usize) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    let last = data.len() - 1;
    let (mut start, mut end) = (start.min(last), end.min(last));
    if end < start {
        std::mem::swap(&mut start, &mut end);
    }
    let slice = &data[start..=end];
    slice.iter().map(|&b| b as f32).sum::<f32>() / slice.len() as f32
}

/// Root mean square of a waveform
pub fn rms(data: &[f32]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    (data.iter().map(|s| s * s).sum::<f32>() / data.len() as f32).sqrt()
}

/// Normalised energy (0.0 - 1.0) of the ±2 bins around `freq`
pub fn band_energy_around(spectrum: &[u8], sample_rate: u32, freq: f32) -> f32 {
    if spectrum.is_empty() {
        return 0.0;
    }
    let bin_width = sample_rate as f32 / 2.0 / spectrum.len() as f32;
    let bin = (freq / bin_width).floor().max(0.0) as usize;
    let start = bin.saturating_sub(2);
    let end = (bin + 2).min(spectrum.len() - 1);
    avg_range(spectrum, start, end) / 255.0
}

/// Normalised energies (0.0 - 1.0) of the classifier's fixed bin ranges
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandEnergies {
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
    pub speech: f32,
    pub lfe: f32,
    pub vocal_high: f32,
}

impl BandEnergies {
    /// Compute energies from a byte spectrum (ranges assume 1024 bins)
    pub fn from_spectrum(spectrum: &[u8]) -> Self {
        let last = spectrum.len().saturating_sub(1);
        Self {
            bass: avg_range(spectrum, 0, 50) / 255.0,
            mid: avg_range(spectrum, 50, 150) / 255.0,
            high: avg_range(spectrum, 150, last) / 255.0,
            speech: avg_range(spectrum, 10, 30) / 255.0,
            lfe: avg_range(spectrum, 0, 10) / 255.0,
            vocal_high: avg_range(spectrum, 30, 50) / 255.0,
        }
    }
}

/// One frame's worth of features
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpectralFeatures {
    pub energies: BandEnergies,
    pub rms: f32,
}

/// Pulls one snapshot per frame from a tap and keeps it for the frame's consumers
pub struct SpectralFeatureExtractor {
    spectrum: Vec<u8>,
    waveform: Vec<f32>,
    sample_rate: u32,
    features: SpectralFeatures,
}

impl SpectralFeatureExtractor {
    /// Create an extractor with buffers sized for `fft_size`
    pub fn new(fft_size: usize) -> Self {
        Self {
            spectrum: vec![0; fft_size / 2],
            waveform: vec![0.0; fft_size],
            sample_rate: 0,
            features: SpectralFeatures::default(),
        }
    }

    /// Pull a fresh snapshot from `tap`.
    ///
    /// Buffers are resized only when the tap's window length changes.
    pub fn extract(&mut self, tap: &mut dyn MonitoringTap) -> Result<SpectralFeatures, AnalysisError> {
        let bins = tap.frequency_bin_count();
        let size = tap.fft_size();
        if self.spectrum.len() != bins {
            self.spectrum.resize(bins, 0);
        }
        if self.waveform.len() != size {
            self.waveform.resize(size, 0.0);
        }

        tap.byte_frequency_data(&mut self.spectrum)?;
        tap.float_time_domain_data(&mut self.waveform)?;
        self.sample_rate = tap.sample_rate();

        self.features = SpectralFeatures {
            energies: BandEnergies::from_spectrum(&self.spectrum),
            rms: rms(&self.waveform),
        };
        Ok(self.features)
    }

    /// Byte spectrum from the last snapshot
    pub fn spectrum(&self) -> &[u8] {
        &self.spectrum
    }

    /// Waveform from the last snapshot
    pub fn waveform(&self) -> &[f32] {
        &self.waveform
    }

    /// Sample rate reported by the tap at the last snapshot
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Features from the last snapshot
    pub fn features(&self) -> SpectralFeatures {
        self.features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTap {
        spectrum: Vec<u8>,
        level: f32,
    }

    impl MonitoringTap for FixedTap {
        fn sample_rate(&self) -> u32 {
            48000
        }

        fn fft_size(&self) -> usize {
            self.spectrum.len() * 2
        }

        fn byte_frequency_data(&mut self, out: &mut [u8]) -> Result<(), AnalysisError> {
            out.copy_from_slice(&self.spectrum);
            Ok(())
        }

        fn float_time_domain_data(&mut self, out: &mut [f32]) -> Result<(), AnalysisError> {
            out.fill(self.level);
            Ok(())
        }
    }

    #[test]
    fn test_avg_range_is_inclusive() {
        let data = [0u8, 10, 20, 30];
        assert!((avg_range(&data, 1, 2) - 15.0).abs() < 1e-6);
        assert!((avg_range(&data, 0, 3) - 15.0).abs() < 1e-6);
    }

    #[test]
    fn test_avg_range_clamps_and_swaps() {
        let data = [10u8, 20, 30];
        assert!((avg_range(&data, 2, 0) - 20.0).abs() < 1e-6);
        assert!((avg_range(&data, 1, 100) - 25.0).abs() < 1e-6);
        assert_eq!(avg_range(&[], 0, 5), 0.0);
    }

    #[test]
    fn test_rms_of_constant() {
        assert!((rms(&[0.5; 64]) - 0.5).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_band_energy_window() {
        let mut spectrum = vec![0u8; 1024];
        // 1000 Hz at 23.4 Hz/bin lands in bin 42
        spectrum[40..=44].fill(255);
        let energy = band_energy_around(&spectrum, 48000, 1000.0);
        assert!((energy - 1.0).abs() < 1e-6, "energy = {}", energy);
    }

    #[test]
    fn test_band_energies_ranges() {
        let mut spectrum = vec![0u8; 1024];
        spectrum[0..=10].fill(255);
        let energies = BandEnergies::from_spectrum(&spectrum);
        assert!((energies.lfe - 1.0).abs() < 1e-6);
        assert!((energies.bass - 11.0 / 51.0).abs() < 1e-6);
        assert!((energies.speech - 1.0 / 21.0).abs() < 1e-6);
        assert_eq!(energies.high, 0.0);
    }

    #[test]
    fn test_extractor_snapshot() {
        let mut tap = FixedTap {
            spectrum: vec![51; 1024],
            level: 0.25,
        };
        let mut extractor = SpectralFeatureExtractor::new(512);
        let features = extractor.extract(&mut tap).unwrap();

        assert_eq!(extractor.spectrum().len(), 1024);
        assert_eq!(extractor.waveform().len(), 2048);
        assert!((features.energies.mid - 0.2).abs() < 1e-6);
        assert!((features.rms - 0.25).abs() < 1e-6);
        assert_eq!(extractor.sample_rate(), 48000);
    }
}

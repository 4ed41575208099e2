//! Per-stream voice activity and noise tracking

use crate::avg_range;

/// Half the bus analyser window: one estimate per classifier bin
const ESTIMATE_LEN: usize = crate::BUS_FFT_SIZE / 2;

/// Result of one voice analysis tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VoiceActivity {
    /// Share of spectral energy in the vocal bins (0.0 - 1.0)
    pub voice_activity: f32,
    /// Strong bass with little vocal content
    pub is_music: bool,
}

/// Tracks voice activity plus running noise and signal estimates
pub struct VoiceActivityEstimator {
    noise: Vec<f32>,
    signal: Vec<f32>,
    last: VoiceActivity,
}

impl Default for VoiceActivityEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceActivityEstimator {
    pub fn new() -> Self {
        Self {
            noise: vec![0.0; ESTIMATE_LEN],
            signal: vec![0.0; ESTIMATE_LEN],
            last: VoiceActivity::default(),
        }
    }

    /// Analyse one byte spectrum from the stream's voice tap
    pub fn update(&mut self, spectrum: &[u8]) -> VoiceActivity {
        let vocal = avg_range(spectrum, 10, 30) / 255.0;
        let total = avg_range(spectrum, 0, spectrum.len().saturating_sub(1)) / 255.0;
        let bass = avg_range(spectrum, 0, 10) / 255.0;

        self.last = VoiceActivity {
            voice_activity: (vocal / (total + 0.001)).min(1.0),
            is_music: bass > 0.6 && vocal < 0.3,
        };

        // Only bins the tap actually produced are updated
        for ((noise, signal), &byte) in self
            .noise
            .iter_mut()
            .zip(self.signal.iter_mut())
            .zip(spectrum.iter())
        {
            let current = byte as f32 / 255.0;
            *noise = *noise * 0.95 + current * 0.05;
            *signal = (*signal * 0.9).max(current);
        }

        self.last
    }

    pub fn last(&self) -> VoiceActivity {
        self.last
    }

    pub fn noise_estimate(&self) -> &[f32] {
        &self.noise
    }

    pub fn signal_estimate(&self) -> &[f32] {
        &self.signal
    }

    /// Wiener-style suppression gain for `bin` from the running estimates
    pub fn wiener_gain(&self, bin: usize) -> f32 {
        let noise = self.noise.get(bin).copied().unwrap_or(0.0);
        let signal = self.signal.get(bin).copied().unwrap_or(0.0);
        wiener_gain(signal, noise, 0.95)
    }

    pub fn reset(&mut self) {
        self.noise.fill(0.0);
        self.signal.fill(0.0);
        self.last = VoiceActivity::default();
    }
}

/// `(snr / (snr + 1)) * alpha + (1 - alpha)`, clamped to 0.0 - 1.0.
///
/// Zero estimates are floored at 0.001 so silence yields a neutral SNR.
pub fn wiener_gain(signal: f32, noise: f32, alpha: f32) -> f32 {
    let noise = if noise > 0.0 { noise } else { 0.001 };
    let signal = if signal > 0.0 { signal } else { 0.001 };
    let snr = signal / noise;
    ((snr / (snr + 1.0)) * alpha + (1.0 - alpha)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_dominant_spectrum() {
        let mut spectrum = vec![0u8; 256];
        spectrum[10..=30].fill(200);
        let mut vad = VoiceActivityEstimator::new();
        let result = vad.update(&spectrum);

        // vocal / total is far above 1 before clamping
        assert_eq!(result.voice_activity, 1.0);
        assert!(!result.is_music);
    }

    #[test]
    fn test_bass_heavy_is_music() {
        let mut spectrum = vec![20u8; 256];
        spectrum[0..=10].fill(250);
        let mut vad = VoiceActivityEstimator::new();
        let result = vad.update(&spectrum);

        assert!(result.is_music);
    }

    #[test]
    fn test_silence_has_no_activity() {
        let mut vad = VoiceActivityEstimator::new();
        let result = vad.update(&[0u8; 256]);
        assert_eq!(result.voice_activity, 0.0);
        assert!(!result.is_music);
    }

    #[test]
    fn test_estimates_track_input() {
        let mut vad = VoiceActivityEstimator::new();
        vad.update(&[255u8; 256]);
        assert!((vad.noise_estimate()[0] - 0.05).abs() < 1e-6);
        assert!((vad.signal_estimate()[0] - 1.0).abs() < 1e-6);
        // Bins beyond the tap's length stay untouched
        assert_eq!(vad.noise_estimate()[300], 0.0);

        vad.update(&[0u8; 256]);
        assert!((vad.signal_estimate()[0] - 0.9).abs() < 1e-6);
        assert!((vad.noise_estimate()[0] - 0.0475).abs() < 1e-6);
    }

    #[test]
    fn test_wiener_gain_bounds() {
        assert!((wiener_gain(0.0, 0.0, 0.95) - 0.525).abs() < 1e-6);
        assert!(wiener_gain(1.0, 0.001, 0.95) > 0.99);
        assert!(wiener_gain(0.001, 1.0, 0.95) < 0.06);
    }
}

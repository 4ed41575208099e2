//! Linked multi-channel compressor
//!
//! Soft-knee peak compressor shared by every stream's dynamics chain and the
//! output bus. All channels are detected together so the image never shifts.

use super::{Effect, SmoothedParam, FADE_TIME};

/// Static compressor settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorSettings {
    /// Threshold in dB
    pub threshold: f32,
    /// Knee width in dB
    pub knee: f32,
    /// Compression ratio (1 - 20)
    pub ratio: f32,
    /// Attack time in seconds
    pub attack: f32,
    /// Release time in seconds
    pub release: f32,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            threshold: -24.0,
            knee: 30.0,
            ratio: 12.0,
            attack: 0.003,
            release: 0.25,
        }
    }
}

/// Convert dB to linear
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Convert linear to dB
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear > 1e-10 {
        20.0 * linear.log10()
    } else {
        -200.0
    }
}

/// Linked compressor over interleaved frames
pub struct Compressor {
    enabled: bool,
    channels: usize,
    settings: CompressorSettings,
    ratio: SmoothedParam,

    // Computed coefficients
    attack_coeff: f32,
    release_coeff: f32,

    // Envelope follower state
    envelope: f32,

    // Gain smoothing
    gain_smooth: f32,
    gain_smooth_coeff: f32,

    // Metering
    current_gr_db: f32,

    // Makeup gain (auto-calculated based on compression settings)
    makeup_gain: f32,
}

impl Compressor {
    pub fn new(sample_rate: f32, channels: usize, settings: CompressorSettings) -> Self {
        let ratio = settings.ratio.clamp(1.0, 20.0);
        let mut comp = Self {
            enabled: true,
            channels: channels.max(1),
            settings: CompressorSettings { ratio, ..settings },
            ratio: SmoothedParam::new(ratio, sample_rate, FADE_TIME),
            attack_coeff: (-1.0 / (sample_rate * settings.attack.max(1e-4))).exp(),
            release_coeff: (-1.0 / (sample_rate * settings.release.max(1e-3))).exp(),
            envelope: 1.0,
            gain_smooth: 1.0,
            gain_smooth_coeff: 0.999,
            current_gr_db: 0.0,
            makeup_gain: 1.0,
        };
        comp.calculate_makeup_gain();
        comp
    }

    /// Ramp the ratio toward a new value (1 - 20)
    pub fn set_ratio(&mut self, ratio: f32) {
        if !ratio.is_finite() {
            return;
        }
        let ratio = ratio.clamp(1.0, 20.0);
        self.settings.ratio = ratio;
        self.ratio.set_target(ratio);
        self.calculate_makeup_gain();
    }

    /// Ratio the compressor is ramping toward
    pub fn ratio(&self) -> f32 {
        self.settings.ratio
    }

    pub fn settings(&self) -> CompressorSettings {
        self.settings
    }

    /// Get current gain reduction in dB (for metering)
    pub fn gain_reduction_db(&self) -> f32 {
        self.current_gr_db
    }

    /// Calculate automatic makeup gain based on compression settings
    fn calculate_makeup_gain(&mut self) {
        // Estimate average gain reduction and compensate
        let s = &self.settings;
        let avg_compression_db = (s.threshold.abs() * (1.0 - 1.0 / s.ratio)) / 4.0;
        self.makeup_gain = db_to_linear(avg_compression_db.min(6.0));
    }

    /// Compute gain reduction with soft knee
    #[inline]
    fn compute_gain_reduction(&self, input_db: f32, ratio: f32) -> f32 {
        let threshold = self.settings.threshold;
        let knee = self.settings.knee;

        if input_db < threshold - knee / 2.0 {
            // Below knee - no compression
            0.0
        } else if knee <= 0.0 || input_db > threshold + knee / 2.0 {
            // Above knee - full compression
            threshold + (input_db - threshold) / ratio - input_db
        } else {
            // In knee - quadratic transition
            let x = input_db - (threshold - knee / 2.0);
            (1.0 / ratio - 1.0) * (x * x) / (2.0 * knee)
        }
    }

    #[inline]
    fn process_frame(&mut self, frame: &mut [f32]) {
        let ratio = self.ratio.next();

        // Peak detection (linked)
        let peak = frame.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        let gr_db = self.compute_gain_reduction(linear_to_db(peak), ratio);
        let target_gain = db_to_linear(gr_db);

        // Program-dependent release: slower release when compressing more
        let coeff = if target_gain < self.envelope {
            self.attack_coeff
        } else {
            let gr_factor = 1.0 + (-gr_db / 10.0).min(1.0);
            self.release_coeff.powf(1.0 / gr_factor)
        };
        self.envelope = coeff * self.envelope + (1.0 - coeff) * target_gain;

        // Apply gain smoothing to avoid zipper noise
        self.gain_smooth = self.gain_smooth_coeff * self.gain_smooth
            + (1.0 - self.gain_smooth_coeff) * self.envelope;
        self.current_gr_db = linear_to_db(self.gain_smooth);

        let gain = self.gain_smooth * self.makeup_gain;
        for sample in frame.iter_mut() {
            *sample *= gain;
        }
    }
}

impl Effect for Compressor {
    fn process(&mut self, samples: &mut [f32]) {
        if !self.enabled {
            return;
        }
        let channels = self.channels;
        for frame in samples.chunks_exact_mut(channels) {
            self.process_frame(frame);
        }
    }

    fn reset(&mut self) {
        self.envelope = 1.0;
        self.gain_smooth = 1.0;
        self.current_gr_db = 0.0;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.reset();
        }
    }

    fn name(&self) -> &'static str {
        "Compressor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let comp = Compressor::new(48000.0, 6, CompressorSettings::default());
        assert!(comp.is_enabled());
        assert_eq!(comp.settings().threshold, -24.0);
        assert_eq!(comp.settings().knee, 30.0);
        assert_eq!(comp.ratio(), 12.0);
    }

    #[test]
    fn test_disabled_passthrough() {
        let mut comp = Compressor::new(48000.0, 2, CompressorSettings::default());
        comp.set_enabled(false);

        let mut samples = vec![0.5, 0.5, 0.3, 0.3];
        let original = samples.clone();
        comp.process(&mut samples);

        assert_eq!(samples, original);
    }

    #[test]
    fn test_loud_signal_compression() {
        let mut comp = Compressor::new(48000.0, 2, CompressorSettings::default());
        let mut samples = vec![0.9f32; 2 * 24000];
        comp.process(&mut samples);

        let gr = comp.gain_reduction_db();
        assert!(gr < -6.0, "Expected gain reduction, got {} dB", gr);
    }

    #[test]
    fn test_quiet_signal_untouched_by_reduction() {
        let mut comp = Compressor::new(48000.0, 2, CompressorSettings::default());
        // -60 dBFS is far below the knee
        let mut samples = vec![0.001f32; 2 * 4800];
        comp.process(&mut samples);
        assert!(comp.gain_reduction_db().abs() < 0.01);
    }

    #[test]
    fn test_ratio_clamped_and_ramped() {
        let mut comp = Compressor::new(48000.0, 6, CompressorSettings::default());
        comp.set_ratio(50.0);
        assert_eq!(comp.ratio(), 20.0);
        comp.set_ratio(0.2);
        assert_eq!(comp.ratio(), 1.0);
    }

    #[test]
    fn test_channels_are_linked() {
        let mut comp = Compressor::new(48000.0, 2, CompressorSettings::default());
        let mut samples = vec![0.0f32; 2 * 24000];
        for frame in samples.chunks_exact_mut(2) {
            frame[0] = 0.9;
            frame[1] = 0.1;
        }
        comp.process(&mut samples);
        let n = samples.len();
        // Both channels receive the same gain
        assert!((samples[n - 2] / samples[n - 1] - 9.0).abs() < 1e-3);
    }
}

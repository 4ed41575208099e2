//! Nine-band adaptive equalizer
//!
//! Static gains come from the active preset. While auto-EQ runs, each band is
//! nudged by the current content (voice activity, bass overload, music) and
//! ramped toward the result with a slower time constant.

use halo_analysis::{band_energy_around, VoiceActivity};

use crate::effects::{Effect, Filter, FilterShape};
use crate::prefs::{BAND_COUNT, CUSTOM_BAND_RANGE, EQ_FREQUENCIES};

/// Q of the outer shelving bands
const SHELF_Q: f32 = 0.7;
/// Q of the inner peaking bands
const PEAK_Q: f32 = 1.2;

/// Ramp time constant for auto-EQ corrections (seconds)
pub const AUTO_EQ_TIME_CONSTANT: f32 = 0.1;

/// Cascade of one low shelf, seven peaking bands and one high shelf (stereo)
pub struct AdaptiveEqualizer {
    bands: Vec<Filter>,
    enabled: bool,
}

impl AdaptiveEqualizer {
    /// Create the cascade settled at `gains` (dB)
    pub fn new(sample_rate: f32, gains: &[f32; BAND_COUNT]) -> Self {
        let bands = EQ_FREQUENCIES
            .iter()
            .zip(gains)
            .enumerate()
            .map(|(i, (&freq, &gain))| {
                let (shape, q) = Self::band_shape(i);
                Filter::with_gain(shape, freq, q, gain, sample_rate, 2)
            })
            .collect();
        Self {
            bands,
            enabled: true,
        }
    }

    fn band_shape(index: usize) -> (FilterShape, f32) {
        match index {
            0 => (FilterShape::LowShelf, SHELF_Q),
            i if i == BAND_COUNT - 1 => (FilterShape::HighShelf, SHELF_Q),
            _ => (FilterShape::Peaking, PEAK_Q),
        }
    }

    /// Ramp every band to a preset's gains
    pub fn set_gains(&mut self, gains: &[f32; BAND_COUNT]) {
        for (band, &gain) in self.bands.iter_mut().zip(gains) {
            band.set_gain_db(gain);
        }
    }

    /// Ramp every band toward auto-EQ targets with the slower time constant
    pub fn auto_adjust(&mut self, targets: &[f32; BAND_COUNT]) {
        for (band, &target) in self.bands.iter_mut().zip(targets) {
            band.set_gain_db_with(target, AUTO_EQ_TIME_CONSTANT);
        }
    }

    /// Gains the bands are ramping toward
    pub fn target_gains(&self) -> [f32; BAND_COUNT] {
        let mut gains = [0.0; BAND_COUNT];
        for (gain, band) in gains.iter_mut().zip(&self.bands) {
            *gain = band.target_gain_db();
        }
        gains
    }

    /// Gains currently applied
    pub fn gains(&self) -> [f32; BAND_COUNT] {
        let mut gains = [0.0; BAND_COUNT];
        for (gain, band) in gains.iter_mut().zip(&self.bands) {
            *gain = band.gain_db();
        }
        gains
    }

    /// Advance every ramp without audio
    pub fn advance(&mut self, frames: usize) {
        for band in &mut self.bands {
            band.advance(frames);
        }
    }
}

impl Effect for AdaptiveEqualizer {
    fn process(&mut self, samples: &mut [f32]) {
        if !self.enabled {
            return;
        }
        for frame in samples.chunks_exact_mut(2) {
            for band in &mut self.bands {
                band.process_frame(frame);
            }
        }
    }

    fn reset(&mut self) {
        for band in &mut self.bands {
            band.reset();
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn name(&self) -> &'static str {
        "Adaptive EQ"
    }
}

/// Per-band auto-EQ targets for one analysis tick.
///
/// `spectrum` is the bus analyser's byte spectrum and `base` the active
/// preset. Results are clamped to ±12 dB.
pub fn auto_eq_targets(
    spectrum: &[u8],
    sample_rate: u32,
    base: &[f32; BAND_COUNT],
    voice: VoiceActivity,
) -> [f32; BAND_COUNT] {
    let mut targets = [0.0; BAND_COUNT];
    for ((target, &freq), &base_gain) in targets.iter_mut().zip(&EQ_FREQUENCIES).zip(base) {
        let energy = band_energy_around(spectrum, sample_rate, freq);
        let mut adjustment = 0.0;

        if (80.0..=500.0).contains(&freq) && voice.voice_activity > 0.3 {
            adjustment += voice.voice_activity * 2.0;
        }
        if freq < 100.0 && energy > 0.8 {
            adjustment -= (energy - 0.8) * 3.0;
        }
        if voice.is_music && freq > 6000.0 {
            adjustment += 0.5;
        }

        *target = (base_gain + adjustment).clamp(CUSTOM_BAND_RANGE.0, CUSTOM_BAND_RANGE.1);
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 48000;

    #[test]
    fn test_neutral_content_keeps_preset() {
        let base = [4.0, 3.0, 2.0, 0.0, 2.0, 3.0, 1.0, 0.0, -1.0];
        let spectrum = vec![100u8; 1024];
        let targets = auto_eq_targets(&spectrum, SR, &base, VoiceActivity::default());
        assert_eq!(targets, base);
    }

    #[test]
    fn test_voice_lifts_speech_bands() {
        let base = [0.0; BAND_COUNT];
        let spectrum = vec![0u8; 1024];
        let voice = VoiceActivity {
            voice_activity: 0.5,
            is_music: false,
        };
        let targets = auto_eq_targets(&spectrum, SR, &base, voice);
        // 150 Hz and 400 Hz sit inside 80 - 500 Hz
        assert_eq!(targets[2], 1.0);
        assert_eq!(targets[3], 1.0);
        assert_eq!(targets[0], 0.0);
        assert_eq!(targets[4], 0.0);
    }

    #[test]
    fn test_bass_overload_is_cut() {
        let base = [0.0; BAND_COUNT];
        let spectrum = vec![255u8; 1024];
        let targets = auto_eq_targets(&spectrum, SR, &base, VoiceActivity::default());
        assert!((targets[0] + 0.6).abs() < 1e-5, "32 Hz target {}", targets[0]);
        assert!((targets[1] + 0.6).abs() < 1e-5, "60 Hz target {}", targets[1]);
        assert_eq!(targets[2], 0.0);
    }

    #[test]
    fn test_music_brightens_top_bands() {
        let base = [0.0; BAND_COUNT];
        let spectrum = vec![0u8; 1024];
        let voice = VoiceActivity {
            voice_activity: 0.0,
            is_music: true,
        };
        let targets = auto_eq_targets(&spectrum, SR, &base, voice);
        assert_eq!(&targets[7..], &[0.5, 0.5]);
        assert_eq!(targets[6], 0.0, "6 kHz itself is not above the threshold");
    }

    #[test]
    fn test_targets_are_clamped() {
        let base = [12.0; BAND_COUNT];
        let voice = VoiceActivity {
            voice_activity: 1.0,
            is_music: true,
        };
        let targets = auto_eq_targets(&[0u8; 1024], SR, &base, voice);
        assert!(targets.iter().all(|&t| t <= 12.0));
    }

    #[test]
    fn test_set_gains_ramps_each_band() {
        let mut eq = AdaptiveEqualizer::new(48000.0, &[0.0; BAND_COUNT]);
        let music = [2.0, 1.0, 0.0, -1.0, 0.0, 1.0, 2.0, 3.0, 1.0];
        eq.set_gains(&music);
        assert_eq!(eq.target_gains(), music);
        assert_eq!(eq.gains(), [0.0; BAND_COUNT]);

        eq.advance(48000);
        assert_eq!(eq.gains(), music);
    }

    #[test]
    fn test_flat_eq_is_transparent() {
        let mut eq = AdaptiveEqualizer::new(48000.0, &[0.0; BAND_COUNT]);
        let mut samples: Vec<f32> = (0..512).map(|i| ((i as f32) * 0.05).sin()).collect();
        let original = samples.clone();
        eq.process(&mut samples);
        for (a, b) in samples.iter().zip(&original) {
            assert!((a - b).abs() < 1e-4);
        }
    }
}

//! Post-upmix dynamics: auto-gain, noise floor, bass shelf, soft clip, compressor

use crate::effects::{
    Compressor, CompressorSettings, Effect, Filter, FilterShape, SmoothedParam, SoftClipper,
    FADE_TIME,
};
use crate::layout::SURROUND_CHANNELS;
use crate::prefs::Preferences;

/// Low-shelf corner of the bass boost
pub const BASS_SHELF_HZ: f32 = 150.0;
const BASS_SHELF_Q: f32 = 0.707;

/// Noise floor attenuation per unit of noise reduction
const NOISE_FLOOR_DEPTH: f32 = 0.3;

/// Level-tracking parameters for auto-gain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoGainConfig {
    /// RMS the bus is steered toward
    pub target_rms: f32,
    /// Fraction of the distance covered per tick when raising the gain
    pub speed_up: f32,
    /// Fraction of the distance covered per tick when lowering the gain
    pub speed_down: f32,
    pub min_gain: f32,
    pub max_gain: f32,
    /// Below this RMS the signal is treated as silence and left alone
    pub silence_rms: f32,
    /// Ramp time constant for each new gain (seconds)
    pub time_constant: f32,
}

impl Default for AutoGainConfig {
    fn default() -> Self {
        Self {
            target_rms: 0.1,
            speed_up: 0.02,
            speed_down: 0.1,
            min_gain: 0.3,
            max_gain: 4.0,
            silence_rms: 0.001,
            time_constant: 0.05,
        }
    }
}

/// Compressor ratio for a dynamic-range preference
pub fn ratio_for_dynamic_range(dynamic_range: f32) -> f32 {
    (3.0 / dynamic_range).clamp(1.0, 10.0)
}

/// Bass shelf gain in dB for a boost factor
pub fn bass_shelf_db(bass_boost: f32) -> f32 {
    20.0 * bass_boost.log10()
}

/// Per-stream dynamics stage operating on interleaved 5.1
pub struct DynamicsChain {
    enabled: bool,
    sample_rate: f32,
    auto_gain_config: AutoGainConfig,
    auto_gain: SmoothedParam,
    noise_floor: SmoothedParam,
    /// Created the first time the bass boost exceeds unity
    bass_shelf: Option<Filter>,
    soft_clip: SoftClipper,
    compressor: Compressor,
}

impl DynamicsChain {
    pub fn new(sample_rate: f32, prefs: &Preferences) -> Self {
        let auto_gain_config = AutoGainConfig::default();
        let settings = CompressorSettings {
            ratio: ratio_for_dynamic_range(prefs.dynamic_range()),
            ..CompressorSettings::default()
        };
        let mut soft_clip = SoftClipper::new(SURROUND_CHANNELS);
        soft_clip.set_enabled(prefs.distortion_control());

        let mut chain = Self {
            enabled: true,
            sample_rate,
            auto_gain_config,
            auto_gain: SmoothedParam::new(1.0, sample_rate, auto_gain_config.time_constant),
            noise_floor: SmoothedParam::new(
                Self::noise_floor_gain(prefs.noise_reduction()),
                sample_rate,
                FADE_TIME,
            ),
            bass_shelf: None,
            soft_clip,
            compressor: Compressor::new(sample_rate, SURROUND_CHANNELS, settings),
        };
        if prefs.bass_boost() > 1.0 {
            chain.bass_shelf = Some(Filter::with_gain(
                FilterShape::LowShelf,
                BASS_SHELF_HZ,
                BASS_SHELF_Q,
                bass_shelf_db(prefs.bass_boost()),
                sample_rate,
                SURROUND_CHANNELS,
            ));
        }
        chain
    }

    fn noise_floor_gain(noise_reduction: f32) -> f32 {
        1.0 - noise_reduction * NOISE_FLOOR_DEPTH
    }

    /// Ramp every stage toward the preference values
    pub fn apply(&mut self, prefs: &Preferences) {
        self.noise_floor
            .set_target(Self::noise_floor_gain(prefs.noise_reduction()));
        self.compressor
            .set_ratio(ratio_for_dynamic_range(prefs.dynamic_range()));
        self.soft_clip.set_enabled(prefs.distortion_control());

        let shelf_db = bass_shelf_db(prefs.bass_boost());
        match &mut self.bass_shelf {
            Some(shelf) => shelf.set_gain_db(shelf_db),
            None if prefs.bass_boost() > 1.0 => {
                // Fade in from flat
                let mut shelf = Filter::new(
                    FilterShape::LowShelf,
                    BASS_SHELF_HZ,
                    BASS_SHELF_Q,
                    self.sample_rate,
                    SURROUND_CHANNELS,
                );
                shelf.set_gain_db(shelf_db);
                self.bass_shelf = Some(shelf);
            }
            None => {}
        }
    }

    /// One auto-gain tick from the bus RMS; returns the new gain target
    pub fn step_auto_gain(&mut self, rms: f32) -> f32 {
        let cfg = self.auto_gain_config;
        if rms > cfg.silence_rms {
            let current = self.auto_gain.value();
            let target = (cfg.target_rms / rms).clamp(cfg.min_gain, cfg.max_gain);
            let rate = if target > current {
                cfg.speed_up
            } else {
                cfg.speed_down
            };
            self.auto_gain
                .set_target_with(current + (target - current) * rate, cfg.time_constant);
        }
        self.auto_gain.target()
    }

    pub fn auto_gain(&self) -> f32 {
        self.auto_gain.value()
    }

    pub fn noise_floor(&self) -> f32 {
        self.noise_floor.target()
    }

    pub fn compressor_ratio(&self) -> f32 {
        self.compressor.ratio()
    }

    pub fn has_bass_shelf(&self) -> bool {
        self.bass_shelf.is_some()
    }

    pub fn bass_shelf_gain_db(&self) -> Option<f32> {
        self.bass_shelf.as_ref().map(Filter::target_gain_db)
    }

    pub fn soft_clip_enabled(&self) -> bool {
        self.soft_clip.is_enabled()
    }
}

impl Effect for DynamicsChain {
    fn process(&mut self, samples: &mut [f32]) {
        if !self.enabled {
            return;
        }
        for frame in samples.chunks_exact_mut(SURROUND_CHANNELS) {
            let gain = self.auto_gain.next() * self.noise_floor.next();
            for sample in frame.iter_mut() {
                *sample *= gain;
            }
            if let Some(shelf) = &mut self.bass_shelf {
                shelf.process_frame(frame);
            }
        }
        self.soft_clip.process(samples);
        self.compressor.process(samples);
    }

    fn reset(&mut self) {
        if let Some(shelf) = &mut self.bass_shelf {
            shelf.reset();
        }
        self.soft_clip.reset();
        self.compressor.reset();
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
        "Dynamics"
    }
}

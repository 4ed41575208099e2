//! Stereo to 5.1 upmixer

use crate::effects::{DelayLine, Effect, Filter, FilterShape, SmoothedParam, FADE_TIME};
use crate::layout::{
    CENTER, FRONT_LEFT, FRONT_RIGHT, LFE, SURROUND_CHANNELS, SURROUND_LEFT, SURROUND_RIGHT,
};
use crate::prefs::Preferences;

/// Gain applied to the front pair
pub const FRONT_GAIN: f32 = 1.0;
/// Extra centre gain while dialogue enhancement is on
pub const DIALOGUE_BOOST: f32 = 1.3;
/// Centre band-pass: middle of the 280 Hz - 3.2 kHz speech band
pub const CENTER_BAND_HZ: f32 = (280.0 + 3200.0) / 2.0;
pub const CENTER_Q: f32 = 0.8;
pub const LFE_CUTOFF_HZ: f32 = 120.0;
pub const LFE_Q: f32 = 0.707;

/// Derives six channels from a stereo pair.
///
/// Front L/R pass through with crossfeed, the centre is a band-passed L+R,
/// LFE a low-passed L+R and the surrounds are the delayed front pair.
pub struct Upmixer {
    center_filter: Filter,
    lfe_filter: Filter,
    surround_delay: DelayLine,

    front: SmoothedParam,
    center: SmoothedParam,
    lfe: SmoothedParam,
    surround: SmoothedParam,
    crossfeed: SmoothedParam,
}

impl Upmixer {
    pub fn new(sample_rate: f32, prefs: &Preferences) -> Self {
        let param = |value| SmoothedParam::new(value, sample_rate, FADE_TIME);
        Self {
            center_filter: Filter::new(FilterShape::BandPass, CENTER_BAND_HZ, CENTER_Q, sample_rate, 1),
            lfe_filter: Filter::new(FilterShape::LowPass, LFE_CUTOFF_HZ, LFE_Q, sample_rate, 1),
            surround_delay: DelayLine::new(sample_rate, prefs.width_ms()),
            front: param(FRONT_GAIN),
            center: param(Self::center_target(prefs)),
            lfe: param(prefs.lfe_gain()),
            surround: param(prefs.surround_gain()),
            crossfeed: param(prefs.crossfeed()),
        }
    }

    fn center_target(prefs: &Preferences) -> f32 {
        if prefs.dialogue_enhancement() {
            prefs.center_gain() * DIALOGUE_BOOST
        } else {
            prefs.center_gain()
        }
    }

    /// Ramp every gain and the surround delay toward the preference values
    pub fn apply(&mut self, prefs: &Preferences) {
        self.center.set_target(Self::center_target(prefs));
        self.lfe.set_target(prefs.lfe_gain());
        self.surround.set_target(prefs.surround_gain());
        self.crossfeed.set_target(prefs.crossfeed());
        self.surround_delay.set_delay_ms(prefs.width_ms());
    }

    /// Target centre gain, including the dialogue boost
    pub fn center_gain(&self) -> f32 {
        self.center.target()
    }

    pub fn width_ms(&self) -> f32 {
        self.surround_delay.target_delay_ms()
    }

    /// Upmix one stereo frame into `out` (six samples)
    #[inline]
    pub fn process_frame(&mut self, left: f32, right: f32, out: &mut [f32]) {
        let front = self.front.next();
        let center = self.center.next();
        let lfe = self.lfe.next();
        let surround = self.surround.next();
        let crossfeed = self.crossfeed.next() * 0.5;

        let sum = [left + right];
        let mut center_in = sum;
        let mut lfe_in = sum;
        self.center_filter.process_frame(&mut center_in);
        self.lfe_filter.process_frame(&mut lfe_in);
        let (delayed_l, delayed_r) = self.surround_delay.process(left, right);

        let fl = left * front;
        let fr = right * front;
        out[FRONT_LEFT] = fl + fr * crossfeed;
        out[FRONT_RIGHT] = fr + fl * crossfeed;
        out[CENTER] = center_in[0] * center;
        out[LFE] = lfe_in[0] * lfe;
        out[SURROUND_LEFT] = delayed_l * surround;
        out[SURROUND_RIGHT] = delayed_r * surround;
    }

    /// Upmix interleaved stereo into interleaved 5.1
    pub fn process(&mut self, stereo: &[f32], surround: &mut [f32]) {
        for (input, out) in stereo
            .chunks_exact(2)
            .zip(surround.chunks_exact_mut(SURROUND_CHANNELS))
        {
            self.process_frame(input[0], input[1], out);
        }
    }

    pub fn reset(&mut self) {
        self.center_filter.reset();
        self.lfe_filter.reset();
        self.surround_delay.reset();
    }
}

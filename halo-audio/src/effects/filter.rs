//! Multi-channel biquad filter with a ramped gain parameter

use super::{BiquadCoeffs, BiquadState, Effect, FilterShape, SmoothedParam, FADE_TIME};

/// Biquad filter applied identically to every channel of an interleaved buffer
pub struct Filter {
    shape: FilterShape,
    sample_rate: f32,
    freq: f32,
    q: f32,
    channels: usize,
    enabled: bool,

    // Gain in dB, ramped; coefficients follow the ramp
    gain_db: SmoothedParam,
    designed_gain: f32,
    coeffs: BiquadCoeffs,

    states: Vec<BiquadState>,
}

impl Filter {
    /// Redesign once the ramped gain moved this far from the designed one
    const REDESIGN_THRESHOLD_DB: f32 = 0.01;

    /// Create a filter at 0 dB gain
    pub fn new(shape: FilterShape, freq: f32, q: f32, sample_rate: f32, channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            shape,
            sample_rate,
            freq,
            q,
            channels,
            enabled: true,
            gain_db: SmoothedParam::new(0.0, sample_rate, FADE_TIME),
            designed_gain: 0.0,
            coeffs: BiquadCoeffs::design(shape, freq, q, 0.0, sample_rate),
            states: vec![BiquadState::default(); channels],
        }
    }

    /// Create a filter that starts at `gain_db` without ramping
    pub fn with_gain(
        shape: FilterShape,
        freq: f32,
        q: f32,
        gain_db: f32,
        sample_rate: f32,
        channels: usize,
    ) -> Self {
        let mut filter = Self::new(shape, freq, q, sample_rate, channels);
        filter.gain_db.set_immediate(gain_db);
        filter.redesign(gain_db);
        filter
    }

    /// Ramp gain (dB) with the default fade time
    pub fn set_gain_db(&mut self, gain_db: f32) {
        self.gain_db.set_target_with(gain_db, FADE_TIME);
    }

    /// Ramp gain (dB) with a specific time constant
    pub fn set_gain_db_with(&mut self, gain_db: f32, time_constant: f32) {
        self.gain_db.set_target_with(gain_db, time_constant);
    }

    /// Gain the filter is ramping toward
    pub fn target_gain_db(&self) -> f32 {
        self.gain_db.target()
    }

    /// Gain currently applied
    pub fn gain_db(&self) -> f32 {
        self.gain_db.value()
    }

    pub fn frequency(&self) -> f32 {
        self.freq
    }

    pub fn shape(&self) -> FilterShape {
        self.shape
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    fn redesign(&mut self, gain_db: f32) {
        self.coeffs = BiquadCoeffs::design(self.shape, self.freq, self.q, gain_db, self.sample_rate);
        self.designed_gain = gain_db;
    }

    /// Process one interleaved frame of `channels` samples
    #[inline]
    pub fn process_frame(&mut self, frame: &mut [f32]) {
        let gain = self.gain_db.next();
        if (gain - self.designed_gain).abs() > Self::REDESIGN_THRESHOLD_DB
            || (gain == self.gain_db.target() && gain != self.designed_gain)
        {
            self.redesign(gain);
        }

        for (sample, state) in frame.iter_mut().zip(self.states.iter_mut()) {
            *sample = state.process(*sample, &self.coeffs);
        }
    }

    /// Advance the gain ramp by `frames` without audio (used when the chain is idle)
    pub fn advance(&mut self, frames: usize) {
        self.gain_db.advance(frames);
        let gain = self.gain_db.value();
        if gain != self.designed_gain {
            self.redesign(gain);
        }
    }
}

impl Effect for Filter {
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
        for state in &mut self.states {
            state.reset();
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn name(&self) -> &'static str {
        match self.shape {
            FilterShape::LowPass => "LP Filter",
            FilterShape::BandPass => "BP Filter",
            FilterShape::LowShelf => "Low Shelf",
            FilterShape::HighShelf => "High Shelf",
            FilterShape::Peaking => "Peaking EQ",
        }
    }
}

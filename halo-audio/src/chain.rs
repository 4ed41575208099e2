//! Per-stream processing graph
//!
//! ```text
//! source ─ preGain ─ EQ ─ spatial ─ upmix ─ dynamics ─ master ─┐
//!    └──────────────────────── direct ─────────────────────────┴─ bus (5.1)
//! ```
//!
//! Bypass never rebuilds the graph: it crossfades `master` and `direct`.

use tracing::debug;

use crate::dynamics::DynamicsChain;
use crate::effects::{Effect, SmoothedParam, FADE_TIME};
use crate::eq::AdaptiveEqualizer;
use crate::layout::{FRONT_LEFT, FRONT_RIGHT, SURROUND_CHANNELS};
use crate::prefs::{Preferences, BAND_COUNT};
use crate::upmix::Upmixer;

/// Stages that exist in every chain (pre-gain, nine EQ bands, spatial gate,
/// upmixer, noise floor, auto-gain, soft clip, compressor, master, direct)
const FIXED_STAGES: usize = 18;

pub struct ProcessingChain {
    pre_gain: SmoothedParam,
    eq: AdaptiveEqualizer,
    spatial: SmoothedParam,
    upmixer: Upmixer,
    dynamics: DynamicsChain,
    master: SmoothedParam,
    direct: SmoothedParam,
    bypassed: bool,

    stereo: Vec<f32>,
    surround: Vec<f32>,
}

impl ProcessingChain {
    /// Build the graph settled at the current preferences.
    ///
    /// `volume` is the element volume (0.0 - 1.0) the pre-gain tracks.
    pub fn new(
        sample_rate: f32,
        prefs: &Preferences,
        eq_gains: &[f32; BAND_COUNT],
        volume: f32,
    ) -> Self {
        let volume = volume.clamp(0.0, 1.0);
        let param = |value| SmoothedParam::new(value, sample_rate, FADE_TIME);
        let bypassed = !prefs.enabled();
        Self {
            pre_gain: param(volume),
            eq: AdaptiveEqualizer::new(sample_rate, eq_gains),
            spatial: param(Self::spatial_gain(prefs)),
            upmixer: Upmixer::new(sample_rate, prefs),
            dynamics: DynamicsChain::new(sample_rate, prefs),
            master: param(if bypassed { 0.0 } else { prefs.master() }),
            direct: param(if bypassed { volume } else { 0.0 }),
            bypassed,
            stereo: Vec::new(),
            surround: Vec::new(),
        }
    }

    fn spatial_gain(prefs: &Preferences) -> f32 {
        if prefs.spatial_enabled() {
            1.0
        } else {
            0.0
        }
    }

    /// Ramp every stage toward `prefs`, with `eq_gains` as the static EQ
    pub fn apply(&mut self, prefs: &Preferences, eq_gains: &[f32; BAND_COUNT]) {
        self.eq.set_gains(eq_gains);
        self.spatial.set_target(Self::spatial_gain(prefs));
        self.upmixer.apply(prefs);
        self.dynamics.apply(prefs);
        if !self.bypassed {
            self.master.set_target(prefs.master());
        }
    }

    /// Ramp only the static EQ (preset changes)
    pub fn set_eq_gains(&mut self, eq_gains: &[f32; BAND_COUNT]) {
        self.eq.set_gains(eq_gains);
    }

    /// Enter or leave bypass by crossfading the processed and direct paths
    pub fn set_bypass(&mut self, bypass: bool, master: f32, volume: f32) {
        self.bypassed = bypass;
        if bypass {
            self.master.set_target_with(0.0, FADE_TIME);
            self.direct.set_target_with(volume.clamp(0.0, 1.0), FADE_TIME);
        } else {
            self.direct.set_target_with(0.0, FADE_TIME);
            self.master.set_target_with(master, FADE_TIME);
        }
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    /// Follow an element volume change
    pub fn sync_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.pre_gain.set_target_with(volume, FADE_TIME);
        self.direct
            .set_target_with(if self.bypassed { volume } else { 0.0 }, FADE_TIME);
    }

    /// One auto-EQ tick toward `targets`
    pub fn auto_eq(&mut self, targets: &[f32; BAND_COUNT]) {
        self.eq.auto_adjust(targets);
    }

    /// One auto-gain tick from the bus RMS
    pub fn step_auto_gain(&mut self, rms: f32) -> f32 {
        self.dynamics.step_auto_gain(rms)
    }

    pub fn eq(&self) -> &AdaptiveEqualizer {
        &self.eq
    }

    pub fn upmixer(&self) -> &Upmixer {
        &self.upmixer
    }

    pub fn dynamics(&self) -> &DynamicsChain {
        &self.dynamics
    }

    /// Master gain currently applied
    pub fn master(&self) -> f32 {
        self.master.value()
    }

    /// Direct (bypass) gain currently applied
    pub fn direct(&self) -> f32 {
        self.direct.value()
    }

    pub fn master_target(&self) -> f32 {
        self.master.target()
    }

    pub fn direct_target(&self) -> f32 {
        self.direct.target()
    }

    pub fn pre_gain_target(&self) -> f32 {
        self.pre_gain.target()
    }

    /// Process interleaved stereo from the source and mix the result into
    /// `bus` (interleaved 5.1, same frame count)
    pub fn process(&mut self, input: &[f32], bus: &mut [f32]) {
        let frames = (input.len() / 2).min(bus.len() / SURROUND_CHANNELS);
        if frames == 0 {
            return;
        }
        if self.stereo.len() < frames * 2 {
            self.stereo.resize(frames * 2, 0.0);
            self.surround.resize(frames * SURROUND_CHANNELS, 0.0);
        }
        let stereo = &mut self.stereo[..frames * 2];
        let surround = &mut self.surround[..frames * SURROUND_CHANNELS];

        for (dst, src) in stereo.chunks_exact_mut(2).zip(input.chunks_exact(2)) {
            let gain = self.pre_gain.next();
            dst[0] = src[0] * gain;
            dst[1] = src[1] * gain;
        }

        self.eq.process(stereo);

        for frame in stereo.chunks_exact_mut(2) {
            let gain = self.spatial.next();
            frame[0] *= gain;
            frame[1] *= gain;
        }

        self.upmixer.process(stereo, surround);
        self.dynamics.process(surround);

        for ((out, processed), src) in bus
            .chunks_exact_mut(SURROUND_CHANNELS)
            .zip(surround.chunks_exact(SURROUND_CHANNELS))
            .zip(input.chunks_exact(2))
        {
            let master = self.master.next();
            let direct = self.direct.next();
            for (o, p) in out.iter_mut().zip(processed) {
                *o += p * master;
            }
            out[FRONT_LEFT] += src[0] * direct;
            out[FRONT_RIGHT] += src[1] * direct;
        }
    }

    pub fn reset(&mut self) {
        self.eq.reset();
        self.upmixer.reset();
        self.dynamics.reset();
    }

    /// Number of stages currently in the graph
    pub fn stage_count(&self) -> usize {
        FIXED_STAGES + usize::from(self.dynamics.has_bass_shelf())
    }

    /// Tear the graph down, returning how many stages were released
    pub fn release(self) -> usize {
        let released = self.stage_count();
        debug!("Released processing chain ({} stages)", released);
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn chain(prefs: &Preferences) -> ProcessingChain {
        let gains = prefs.preset().builtin_gains().unwrap_or([0.0; BAND_COUNT]);
        ProcessingChain::new(SR, prefs, &gains, 0.8)
    }

    #[test]
    fn test_enabled_chain_starts_processed() {
        let chain = chain(&Preferences::default());
        assert!(!chain.is_bypassed());
        assert_eq!(chain.master_target(), 1.0);
        assert_eq!(chain.direct_target(), 0.0);
        assert_eq!(chain.pre_gain_target(), 0.8);
    }

    #[test]
    fn test_disabled_chain_starts_bypassed() {
        let mut prefs = Preferences::default();
        prefs.set_enabled(false);
        let chain = chain(&prefs);
        assert!(chain.is_bypassed());
        assert_eq!(chain.master_target(), 0.0);
        assert_eq!(chain.direct_target(), 0.8);
    }

    #[test]
    fn test_bypass_crossfade_targets() {
        let mut chain = chain(&Preferences::default());
        chain.set_bypass(true, 1.2, 0.6);
        assert_eq!(chain.master_target(), 0.0);
        assert_eq!(chain.direct_target(), 0.6);

        chain.set_bypass(false, 1.2, 0.6);
        assert_eq!(chain.master_target(), 1.2);
        assert_eq!(chain.direct_target(), 0.0);
    }

    #[test]
    fn test_bypass_crossfade_settles() {
        let mut chain = chain(&Preferences::default());
        let input = vec![0.1f32; 2 * 1024];
        let mut bus = vec![0.0; SURROUND_CHANNELS * 1024];

        chain.set_bypass(true, 1.0, 0.8);
        for _ in 0..50 {
            chain.process(&input, &mut bus);
        }
        assert_eq!((chain.master(), chain.direct()), (0.0, 0.8));

        chain.set_bypass(false, 1.0, 0.8);
        for _ in 0..50 {
            chain.process(&input, &mut bus);
        }
        assert_eq!((chain.master(), chain.direct()), (1.0, 0.0));
    }

    #[test]
    fn test_apply_keeps_master_silent_while_bypassed() {
        let mut prefs = Preferences::default();
        let mut chain = chain(&prefs);
        chain.set_bypass(true, prefs.master(), 0.8);

        prefs.set_gain(crate::prefs::GainChannel::Master, 1.5);
        chain.apply(&prefs, &[0.0; BAND_COUNT]);
        assert_eq!(chain.master_target(), 0.0);
    }

    #[test]
    fn test_sync_volume_follows_bypass_state() {
        let mut chain = chain(&Preferences::default());
        chain.sync_volume(0.4);
        assert_eq!(chain.pre_gain_target(), 0.4);
        assert_eq!(chain.direct_target(), 0.0);

        chain.set_bypass(true, 1.0, 0.4);
        chain.sync_volume(0.3);
        assert_eq!(chain.direct_target(), 0.3);
    }

    #[test]
    fn test_bypassed_chain_passes_source_to_fronts() {
        let mut prefs = Preferences::default();
        prefs.set_enabled(false);
        let mut chain = ProcessingChain::new(SR, &prefs, &[0.0; BAND_COUNT], 1.0);

        let input = vec![0.25f32; 2 * 64];
        let mut bus = vec![0.0; SURROUND_CHANNELS * 64];
        chain.process(&input, &mut bus);

        let last = &bus[bus.len() - SURROUND_CHANNELS..];
        assert!((last[FRONT_LEFT] - 0.25).abs() < 1e-6);
        assert!((last[FRONT_RIGHT] - 0.25).abs() < 1e-6);
        assert_eq!(last[2], 0.0);
    }

    #[test]
    fn test_processed_chain_fills_all_channels() {
        let mut chain = chain(&Preferences::default());
        let input: Vec<f32> = (0..2 * 4800)
            .map(|i| ((i / 2) as f32 * 0.05).sin() * 0.3)
            .collect();
        let mut bus = vec![0.0; SURROUND_CHANNELS * 4800];
        chain.process(&input, &mut bus);

        for channel in 0..SURROUND_CHANNELS {
            let energy: f32 = bus
                .chunks_exact(SURROUND_CHANNELS)
                .map(|f| f[channel] * f[channel])
                .sum();
            assert!(energy > 0.0, "channel {} is silent", channel);
        }
    }

    #[test]
    fn test_release_counts_bass_shelf() {
        let mut prefs = Preferences::default();
        assert_eq!(chain(&prefs).release(), FIXED_STAGES);

        prefs.set_bass_boost(1.3);
        assert_eq!(chain(&prefs).release(), FIXED_STAGES + 1);
    }
}

//! One playing media source and its processing graph

use std::fmt;
use std::time::Duration;

use halo_analysis::{
    AnalysisError, MonitoringTap, SpectralFeatureExtractor, SpectrumAnalyzer,
    VoiceActivityEstimator, VOICE_FFT_SIZE,
};
use tracing::{debug, warn};

use crate::chain::ProcessingChain;
use crate::eq::auto_eq_targets;
use crate::error::CaptureError;
use crate::layout::{FRONT_LEFT, FRONT_RIGHT, SURROUND_CHANNELS};
use crate::prefs::{Preferences, BAND_COUNT};
use crate::schedule::{CleanupReason, CleanupTimer, EndedWatch, FrameLoop};

/// Stable identifier of an attached stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Uninitialized,
    Building,
    Active,
    Bypassed,
    /// Capture refused; the source plays natively until cleanup
    DrmBlocked,
    CleanupScheduled,
    Destroyed,
}

impl StreamState {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamState::Uninitialized => "uninitialized",
            StreamState::Building => "building",
            StreamState::Active => "active",
            StreamState::Bypassed => "bypassed",
            StreamState::DrmBlocked => "drm-blocked",
            StreamState::CleanupScheduled => "cleanup-scheduled",
            StreamState::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A playable element the core can route through its graph.
///
/// Samples are stereo interleaved at the engine's sample rate.
pub trait MediaSource: Send {
    /// Identity of the underlying element; attaching the same one twice is a no-op
    fn source_key(&self) -> u64;

    /// Element volume (0.0 - 1.0)
    fn volume(&self) -> f32;

    fn set_volume(&mut self, volume: f32);

    fn is_muted(&self) -> bool;

    fn set_muted(&mut self, muted: bool);

    /// Route the element's output into the core
    fn capture(&mut self) -> Result<(), CaptureError>;

    /// Hand the element's output back to its native path
    fn release_capture(&mut self) {}

    fn has_ended(&self) -> bool;

    fn is_paused(&self) -> bool;

    /// Media error raised since the last call, if any
    fn take_error(&mut self) -> Option<String>;

    /// Fill `out` with the next stereo frames; returns the frame count written
    fn fill(&mut self, out: &mut [f32]) -> usize;
}

/// Shared per-frame inputs for [`Stream::on_frame`]
pub struct FrameContext<'a> {
    pub now: Duration,
    pub prefs: &'a Preferences,
    /// Gains of the active preset
    pub eq_base: &'a [f32; BAND_COUNT],
    /// Bus analysis from this frame; `None` when the monitoring tap failed
    pub bus: Option<&'a SpectralFeatureExtractor>,
}

/// Volume and mute state found on the element before it was captured
#[derive(Debug, Clone, Copy, PartialEq)]
struct OriginalSettings {
    volume: f32,
    muted: bool,
}

pub struct Stream {
    id: StreamId,
    source: Box<dyn MediaSource>,
    state: StreamState,
    reported: StreamState,
    chain: Option<ProcessingChain>,
    original: Option<OriginalSettings>,

    voice_tap: Option<SpectrumAnalyzer>,
    voice_spectrum: Vec<u8>,
    voice: VoiceActivityEstimator,

    voice_loop: FrameLoop,
    auto_eq_loop: FrameLoop,
    auto_gain_loop: FrameLoop,
    cleanup: CleanupTimer,
    ended_watch: EndedWatch,

    last_volume: f32,
    was_ended: bool,
    input: Vec<f32>,
}

impl Stream {
    pub fn new(id: StreamId, source: Box<dyn MediaSource>) -> Self {
        let last_volume = source.volume();
        Self {
            id,
            source,
            state: StreamState::Uninitialized,
            reported: StreamState::Uninitialized,
            chain: None,
            original: None,
            voice_tap: None,
            voice_spectrum: vec![0; VOICE_FFT_SIZE / 2],
            voice: VoiceActivityEstimator::new(),
            voice_loop: FrameLoop::new("voice activity"),
            auto_eq_loop: FrameLoop::new("auto-EQ"),
            auto_gain_loop: FrameLoop::new("auto-gain"),
            cleanup: CleanupTimer::default(),
            ended_watch: EndedWatch::default(),
            last_volume,
            was_ended: false,
            input: Vec::new(),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn source_key(&self) -> u64 {
        self.source.source_key()
    }

    /// Current lifecycle state; a pending cleanup overrides the base state
    pub fn state(&self) -> StreamState {
        match self.state {
            StreamState::Destroyed => StreamState::Destroyed,
            _ if self.cleanup.is_pending() => StreamState::CleanupScheduled,
            state => state,
        }
    }

    /// State change since the previous call, for observers
    pub fn take_state_change(&mut self) -> Option<StreamState> {
        let state = self.state();
        if state == self.reported {
            return None;
        }
        self.reported = state;
        Some(state)
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.state(), StreamState::Active | StreamState::Bypassed)
    }

    pub fn is_cleanup_pending(&self) -> bool {
        self.cleanup.is_pending()
    }

    pub fn chain(&self) -> Option<&ProcessingChain> {
        self.chain.as_ref()
    }

    pub fn voice(&self) -> &VoiceActivityEstimator {
        &self.voice
    }

    pub fn source(&self) -> &dyn MediaSource {
        self.source.as_ref()
    }

    pub fn loops_running(&self) -> (bool, bool, bool) {
        (
            self.voice_loop.is_running(),
            self.auto_eq_loop.is_running(),
            self.auto_gain_loop.is_running(),
        )
    }

    /// Capture the source and build the graph.
    ///
    /// On failure the stream falls back to native playback, becomes
    /// [`StreamState::DrmBlocked`] and arms its cleanup.
    pub fn build(
        &mut self,
        sample_rate: u32,
        prefs: &Preferences,
        eq_gains: &[f32; BAND_COUNT],
        now: Duration,
    ) -> Result<(), CaptureError> {
        if self.state != StreamState::Uninitialized {
            return Ok(());
        }
        self.state = StreamState::Building;
        self.original.get_or_insert(OriginalSettings {
            volume: self.source.volume(),
            muted: self.source.is_muted(),
        });

        let result = SpectrumAnalyzer::new(sample_rate, VOICE_FFT_SIZE)
            .map_err(|e| CaptureError::Failed(e.to_string()))
            .and_then(|tap| {
                self.source.capture()?;
                Ok(tap)
            });

        match result {
            Ok(tap) => {
                self.voice_tap = Some(tap);
                self.source.set_muted(true);
                self.last_volume = self.source.volume();
                self.chain = Some(ProcessingChain::new(
                    sample_rate as f32,
                    prefs,
                    eq_gains,
                    self.last_volume,
                ));
                self.state = if prefs.enabled() {
                    StreamState::Active
                } else {
                    StreamState::Bypassed
                };
                self.start_loops(prefs);
                debug!("Stream {} built ({})", self.id, self.state);
                Ok(())
            }
            Err(e) => {
                self.handle_drm(now);
                Err(e)
            }
        }
    }

    fn handle_drm(&mut self, now: Duration) {
        warn!("Stream {} cannot be captured, playing natively", self.id);
        self.state = StreamState::DrmBlocked;
        self.source.set_muted(false);
        self.cleanup.cancel();
        self.cleanup.arm(now, CleanupReason::Drm);
    }

    /// Start whichever loops the preferences call for
    pub fn start_loops(&mut self, prefs: &Preferences) {
        if !self.is_processing() {
            return;
        }
        self.voice_loop.start();
        if self.state == StreamState::Active {
            if prefs.auto_eq() {
                self.auto_eq_loop.start();
            }
            if prefs.loudness() {
                self.auto_gain_loop.start();
            }
        }
    }

    fn stop_loops(&mut self) {
        self.voice_loop.stop();
        self.auto_eq_loop.stop();
        self.auto_gain_loop.stop();
    }

    /// Follow the preferences; loops that became wanted are started
    pub fn apply(&mut self, prefs: &Preferences, eq_gains: &[f32; BAND_COUNT]) {
        if let Some(chain) = &mut self.chain {
            chain.apply(prefs, eq_gains);
        }
        self.start_loops(prefs);
    }

    /// Ramp only the static EQ
    pub fn set_eq_gains(&mut self, eq_gains: &[f32; BAND_COUNT]) {
        if let Some(chain) = &mut self.chain {
            chain.set_eq_gains(eq_gains);
        }
    }

    /// Switch between processed and bypassed output.
    ///
    /// Ignored (returns `false`) while DRM-blocked, cleanup-pending or destroyed.
    pub fn set_enabled(&mut self, enabled: bool, prefs: &Preferences) -> bool {
        if !self.is_processing() {
            return false;
        }
        let Some(chain) = &mut self.chain else {
            return false;
        };
        chain.set_bypass(!enabled, prefs.master(), self.source.volume());
        self.state = if enabled {
            StreamState::Active
        } else {
            StreamState::Bypassed
        };
        self.start_loops(prefs);
        true
    }

    /// Arm cleanup for the next frame
    pub fn request_teardown(&mut self, now: Duration) -> bool {
        if self.state == StreamState::Destroyed {
            return false;
        }
        self.cleanup.arm(now, CleanupReason::Teardown)
    }

    /// Arm cleanup for a media error
    pub fn report_error(&mut self, now: Duration, error: &str) -> bool {
        if self.state == StreamState::Destroyed {
            return false;
        }
        warn!("Stream {} media error: {}", self.id, error);
        self.cleanup.arm(now, CleanupReason::MediaError)
    }

    fn poll_source(&mut self, now: Duration) {
        if let Some(error) = self.source.take_error() {
            self.report_error(now, &error);
        }

        let ended = self.source.has_ended();
        if ended && !self.was_ended {
            self.ended_watch.restart(now);
        }
        self.was_ended = ended;
        if self.ended_watch.poll(now) && self.source.has_ended() && !self.source.is_paused() {
            self.cleanup.arm(now, CleanupReason::Ended);
        }

        let volume = self.source.volume();
        if volume != self.last_volume && !self.cleanup.is_pending() {
            self.last_volume = volume;
            if let Some(chain) = &mut self.chain {
                chain.sync_volume(volume);
            }
        }
    }

    /// Run this stream's share of a frame tick: source events, then the
    /// voice, auto-EQ and auto-gain loops
    pub fn on_frame(&mut self, ctx: &FrameContext<'_>) {
        if self.state == StreamState::Destroyed {
            return;
        }
        self.poll_source(ctx.now);

        let processing = self.is_processing();
        let active = self.state() == StreamState::Active;

        let voice_tap = &mut self.voice_tap;
        let voice_spectrum = &mut self.voice_spectrum;
        let voice = &mut self.voice;
        self.voice_loop.tick(processing, || {
            let tap = voice_tap
                .as_mut()
                .ok_or_else(|| AnalysisError::TapUnavailable("voice tap".into()))?;
            tap.byte_frequency_data(&mut voice_spectrum[..])?;
            voice.update(&voice_spectrum[..]);
            Ok::<(), AnalysisError>(())
        });

        let chain = &mut self.chain;
        let activity = self.voice.last();
        self.auto_eq_loop
            .tick(ctx.prefs.auto_eq() && active, || {
                let bus = ctx
                    .bus
                    .ok_or_else(|| AnalysisError::TapUnavailable("bus monitor".into()))?;
                let targets =
                    auto_eq_targets(bus.spectrum(), bus.sample_rate(), ctx.eq_base, activity);
                if let Some(chain) = chain.as_mut() {
                    chain.auto_eq(&targets);
                }
                Ok::<(), AnalysisError>(())
            });

        let chain = &mut self.chain;
        self.auto_gain_loop
            .tick(ctx.prefs.loudness() && active, || {
                let bus = ctx
                    .bus
                    .ok_or_else(|| AnalysisError::TapUnavailable("bus monitor".into()))?;
                if let Some(chain) = chain.as_mut() {
                    chain.step_auto_gain(bus.features().rms);
                }
                Ok::<(), AnalysisError>(())
            });
    }

    pub fn is_cleanup_due(&self, now: Duration) -> bool {
        self.state != StreamState::Destroyed && self.cleanup.is_due(now)
    }

    /// Stop loops, release the graph, restore the element. Returns the number
    /// of stages released; repeated calls release nothing.
    pub fn destroy(&mut self) -> usize {
        if self.state == StreamState::Destroyed {
            return 0;
        }
        self.stop_loops();
        self.cleanup.cancel();
        self.ended_watch.cancel();

        let released = self.chain.take().map_or(0, ProcessingChain::release);
        self.voice_tap = None;
        if released > 0 {
            self.source.release_capture();
        }
        if let Some(original) = self.original.take() {
            self.source.set_volume(original.volume);
            self.source.set_muted(original.muted);
        }
        self.state = StreamState::Destroyed;
        debug!("Stream {} destroyed", self.id);
        released
    }

    /// Mix `frames` frames of this stream into `bus` (interleaved 5.1)
    pub fn render(&mut self, bus: &mut [f32], frames: usize) {
        let native = match self.state {
            StreamState::Active | StreamState::Bypassed => false,
            StreamState::DrmBlocked => true,
            _ => return,
        };
        let frames = frames.min(bus.len() / SURROUND_CHANNELS);
        if self.input.len() < frames * 2 {
            self.input.resize(frames * 2, 0.0);
        }
        let input = &mut self.input[..frames * 2];
        let written = self.source.fill(input).min(frames);
        input[written * 2..].fill(0.0);

        if native {
            if self.source.is_muted() {
                return;
            }
            let volume = self.source.volume().clamp(0.0, 1.0);
            for (out, src) in bus
                .chunks_exact_mut(SURROUND_CHANNELS)
                .zip(input.chunks_exact(2))
            {
                out[FRONT_LEFT] += src[0] * volume;
                out[FRONT_RIGHT] += src[1] * volume;
            }
            return;
        }

        if let Some(tap) = &mut self.voice_tap {
            tap.push_interleaved(input, 2);
        }
        if let Some(chain) = &mut self.chain {
            chain.process(input, &mut bus[..frames * SURROUND_CHANNELS]);
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    /// Observable state behind a [`FakeSource`]
    #[derive(Debug)]
    pub struct FakeState {
        pub volume: f32,
        pub muted: bool,
        pub protected: bool,
        pub captured: bool,
        pub ended: bool,
        pub paused: bool,
        pub error: Option<String>,
        pub level: f32,
    }

    /// Scripted media source; clones of the handle observe the same state
    #[derive(Clone)]
    pub struct FakeSource {
        pub key: u64,
        pub state: Arc<Mutex<FakeState>>,
    }

    impl FakeSource {
        pub fn new(key: u64) -> Self {
            Self {
                key,
                state: Arc::new(Mutex::new(FakeState {
                    volume: 0.8,
                    muted: false,
                    protected: false,
                    captured: false,
                    ended: false,
                    paused: false,
                    error: None,
                    level: 0.25,
                })),
            }
        }

        pub fn protected(key: u64) -> Self {
            let source = Self::new(key);
            source.state.lock().protected = true;
            source
        }
    }

    impl MediaSource for FakeSource {
        fn source_key(&self) -> u64 {
            self.key
        }

        fn volume(&self) -> f32 {
            self.state.lock().volume
        }

        fn set_volume(&mut self, volume: f32) {
            self.state.lock().volume = volume;
        }

        fn is_muted(&self) -> bool {
            self.state.lock().muted
        }

        fn set_muted(&mut self, muted: bool) {
            self.state.lock().muted = muted;
        }

        fn capture(&mut self) -> Result<(), CaptureError> {
            let mut state = self.state.lock();
            if state.protected {
                return Err(CaptureError::Protected);
            }
            state.captured = true;
            Ok(())
        }

        fn release_capture(&mut self) {
            self.state.lock().captured = false;
        }

        fn has_ended(&self) -> bool {
            self.state.lock().ended
        }

        fn is_paused(&self) -> bool {
            self.state.lock().paused
        }

        fn take_error(&mut self) -> Option<String> {
            self.state.lock().error.take()
        }

        fn fill(&mut self, out: &mut [f32]) -> usize {
            let level = self.state.lock().level;
            out.fill(level);
            out.len() / 2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeSource;
    use super::*;

    const SR: u32 = 48000;

    fn frame_ctx<'a>(now: Duration, prefs: &'a Preferences, base: &'a [f32; 9]) -> FrameContext<'a> {
        FrameContext {
            now,
            prefs,
            eq_base: base,
            bus: None,
        }
    }

    fn built(source: &FakeSource, prefs: &Preferences) -> Stream {
        let mut stream = Stream::new(StreamId(1), Box::new(source.clone()));
        stream
            .build(SR, prefs, &[0.0; BAND_COUNT], Duration::ZERO)
            .unwrap();
        stream
    }

    #[test]
    fn test_build_mutes_and_remembers_original() {
        let source = FakeSource::new(7);
        let stream = built(&source, &Preferences::default());
        assert_eq!(stream.state(), StreamState::Active);
        assert!(source.state.lock().muted);
        assert!(source.state.lock().captured);
    }

    #[test]
    fn test_build_disabled_is_bypassed() {
        let mut prefs = Preferences::default();
        prefs.set_enabled(false);
        let stream = built(&FakeSource::new(1), &prefs);
        assert_eq!(stream.state(), StreamState::Bypassed);
        assert_eq!(stream.loops_running(), (true, false, false));
    }

    #[test]
    fn test_protected_source_falls_back_to_native() {
        let source = FakeSource::protected(3);
        source.state.lock().muted = true;
        let mut stream = Stream::new(StreamId(3), Box::new(source.clone()));
        let err = stream
            .build(SR, &Preferences::default(), &[0.0; BAND_COUNT], Duration::ZERO)
            .unwrap_err();

        assert_eq!(err, CaptureError::Protected);
        assert_eq!(stream.state(), StreamState::CleanupScheduled);
        assert!(!source.state.lock().muted, "element must be audible again");
        assert!(!stream.is_cleanup_due(Duration::from_secs(4)));
        assert!(stream.is_cleanup_due(Duration::from_secs(5)));
    }

    #[test]
    fn test_destroy_restores_and_is_idempotent() {
        let source = FakeSource::new(2);
        let mut stream = built(&source, &Preferences::default());
        source.state.lock().volume = 0.3;

        assert!(stream.destroy() > 0);
        assert_eq!(stream.destroy(), 0);
        assert_eq!(stream.state(), StreamState::Destroyed);

        let state = source.state.lock();
        assert_eq!(state.volume, 0.8);
        assert!(!state.muted);
        assert!(!state.captured);
    }

    #[test]
    fn test_enable_toggle_ignored_while_cleanup_pending() {
        let prefs = Preferences::default();
        let mut stream = built(&FakeSource::new(4), &prefs);
        assert!(stream.request_teardown(Duration::ZERO));
        assert!(!stream.request_teardown(Duration::ZERO), "re-arming is a no-op");
        assert!(!stream.set_enabled(false, &prefs));
        assert_eq!(stream.state(), StreamState::CleanupScheduled);
    }

    #[test]
    fn test_loops_stop_on_bypass() {
        let mut prefs = Preferences::default();
        let base = [0.0; BAND_COUNT];
        let mut stream = built(&FakeSource::new(5), &prefs);
        assert_eq!(stream.loops_running(), (true, true, true));

        prefs.set_enabled(false);
        stream.set_enabled(false, &prefs);
        stream.on_frame(&frame_ctx(Duration::ZERO, &prefs, &base));
        assert_eq!(stream.loops_running(), (true, false, false));
    }

    #[test]
    fn test_missing_bus_stops_only_bus_loops() {
        let prefs = Preferences::default();
        let base = [0.0; BAND_COUNT];
        let mut stream = built(&FakeSource::new(6), &prefs);
        stream.on_frame(&frame_ctx(Duration::ZERO, &prefs, &base));
        assert_eq!(stream.loops_running(), (true, false, false));
    }

    #[test]
    fn test_media_error_arms_cleanup() {
        let prefs = Preferences::default();
        let base = [0.0; BAND_COUNT];
        let source = FakeSource::new(8);
        let mut stream = built(&source, &prefs);
        source.state.lock().error = Some("decode".into());

        stream.on_frame(&frame_ctx(Duration::from_secs(1), &prefs, &base));
        assert!(stream.is_cleanup_pending());
        assert!(stream.is_cleanup_due(Duration::from_secs(11)));
        assert!(!stream.is_processing());
    }

    #[test]
    fn test_ended_stream_cleanup_after_watch() {
        let prefs = Preferences::default();
        let base = [0.0; BAND_COUNT];
        let source = FakeSource::new(9);
        let mut stream = built(&source, &prefs);
        source.state.lock().ended = true;

        stream.on_frame(&frame_ctx(Duration::ZERO, &prefs, &base));
        assert!(!stream.is_cleanup_pending());
        stream.on_frame(&frame_ctx(Duration::from_secs(30), &prefs, &base));
        assert!(stream.is_cleanup_pending());
        assert!(stream.is_cleanup_due(Duration::from_secs(60)));
    }

    #[test]
    fn test_paused_after_end_is_kept() {
        let prefs = Preferences::default();
        let base = [0.0; BAND_COUNT];
        let source = FakeSource::new(10);
        let mut stream = built(&source, &prefs);
        {
            let mut state = source.state.lock();
            state.ended = true;
            state.paused = true;
        }
        stream.on_frame(&frame_ctx(Duration::ZERO, &prefs, &base));
        stream.on_frame(&frame_ctx(Duration::from_secs(30), &prefs, &base));
        assert!(!stream.is_cleanup_pending());
    }

    #[test]
    fn test_volume_change_syncs_chain() {
        let prefs = Preferences::default();
        let base = [0.0; BAND_COUNT];
        let source = FakeSource::new(11);
        let mut stream = built(&source, &prefs);
        source.state.lock().volume = 0.5;

        stream.on_frame(&frame_ctx(Duration::ZERO, &prefs, &base));
        assert_eq!(stream.chain().unwrap().pre_gain_target(), 0.5);
    }

    #[test]
    fn test_drm_stream_renders_natively() {
        let source = FakeSource::protected(12);
        let mut stream = Stream::new(StreamId(12), Box::new(source.clone()));
        let _ = stream.build(SR, &Preferences::default(), &[0.0; BAND_COUNT], Duration::ZERO);

        // Cleanup is pending but the element keeps playing until destroyed
        let mut bus = vec![0.0; SURROUND_CHANNELS * 4];
        stream.render(&mut bus, 4);
        assert!((bus[FRONT_LEFT] - 0.25 * 0.8).abs() < 1e-6);
        assert_eq!(bus[2], 0.0);
    }

    #[test]
    fn test_state_changes_reported_once() {
        let mut stream = built(&FakeSource::new(13), &Preferences::default());
        assert_eq!(stream.take_state_change(), Some(StreamState::Active));
        assert_eq!(stream.take_state_change(), None);
        stream.destroy();
        assert_eq!(stream.take_state_change(), Some(StreamState::Destroyed));
    }
}

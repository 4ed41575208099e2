//! Stream controller - owns preferences, the classifier and every attached stream
//!
//! The host drives it from two places: [`StreamController::on_frame`] once per
//! display frame, and [`StreamController::render`] from its audio callback.
//! A host with a separate audio thread shares the controller behind a mutex.

use std::time::Duration;

use crossbeam_channel::Receiver;
use halo_analysis::{
    BandEnergies, ContentClassifier, Genre, HostContext, MonitoringTap, SpectralFeatureExtractor,
    BUS_FFT_SIZE,
};
use tracing::{debug, info, warn};

use crate::effects::{Compressor, CompressorSettings, Effect};
use crate::error::{ControllerError, StorageError};
use crate::events::{EnhancerEvent, EventBus, StatusLevel};
use crate::layout::SURROUND_CHANNELS;
use crate::prefs::{
    GainChannel, GenreDefaults, PrefKey, Preferences, PresetName, BAND_COUNT,
};
use crate::registry::StreamRegistry;
use crate::storage::PreferenceStorage;
use crate::store::ParameterStore;
use crate::stream::{FrameContext, MediaSource, Stream, StreamId, StreamState};

/// The real-time audio engine the controller renders for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineInfo {
    pub sample_rate: u32,
}

/// Shared 5.1 output stage: the bus compressor
pub struct OutputBus {
    compressor: Compressor,
}

impl OutputBus {
    pub fn new(sample_rate: u32, compressor_enabled: bool) -> Self {
        let mut compressor = Compressor::new(
            sample_rate as f32,
            SURROUND_CHANNELS,
            CompressorSettings::default(),
        );
        compressor.set_enabled(compressor_enabled);
        Self { compressor }
    }

    pub fn set_compressor_enabled(&mut self, enabled: bool) {
        self.compressor.set_enabled(enabled);
    }

    pub fn is_compressor_enabled(&self) -> bool {
        self.compressor.is_enabled()
    }

    pub fn gain_reduction_db(&self) -> f32 {
        self.compressor.gain_reduction_db()
    }

    pub fn process(&mut self, bus: &mut [f32]) {
        self.compressor.process(bus);
    }
}

/// Point-in-time view for UIs
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub sample_rate: u32,
    pub stream_count: usize,
    pub streams: Vec<(StreamId, StreamState)>,
    pub genre: Genre,
    pub confidence: f32,
    pub prefs: Preferences,
    pub custom_preset: [f32; BAND_COUNT],
    /// Most recent warning raised while no observer could see it
    pub last_warning: Option<String>,
}

pub struct StreamController {
    sample_rate: u32,
    store: ParameterStore,
    classifier: ContentClassifier,
    extractor: SpectralFeatureExtractor,
    registry: StreamRegistry,
    events: EventBus,
    output: OutputBus,
    now: Duration,
    last_warning: Option<String>,
}

impl StreamController {
    /// Create the controller and load stored preferences.
    ///
    /// Fails with [`ControllerError::PlatformUnsupported`] when there is no
    /// engine to render for. Storage failures only downgrade to defaults.
    pub fn new(
        engine: Option<EngineInfo>,
        storage: Box<dyn PreferenceStorage>,
    ) -> Result<Self, ControllerError> {
        let engine = engine.ok_or_else(|| {
            ControllerError::PlatformUnsupported("no real-time audio engine".into())
        })?;
        if engine.sample_rate == 0 {
            return Err(ControllerError::PlatformUnsupported(
                "engine reports a zero sample rate".into(),
            ));
        }

        let mut store = ParameterStore::new(storage);
        let mut last_warning = None;
        if let Err(e) = store.reload() {
            warn!("Using default preferences: {}", e);
            last_warning = Some(format!("Could not load preferences: {}", e));
        }
        let output = OutputBus::new(engine.sample_rate, store.prefs().compressor_enabled());

        info!(
            sample_rate = engine.sample_rate,
            preset = %store.prefs().preset(),
            "Stream controller ready"
        );

        Ok(Self {
            sample_rate: engine.sample_rate,
            store,
            classifier: ContentClassifier::default(),
            extractor: SpectralFeatureExtractor::new(BUS_FFT_SIZE),
            registry: StreamRegistry::new(),
            events: EventBus::new(),
            output,
            now: Duration::ZERO,
            last_warning,
        })
    }

    /// Register an observer for [`EnhancerEvent`]s
    pub fn subscribe(&mut self) -> Receiver<EnhancerEvent> {
        self.events.subscribe()
    }

    pub fn set_host_context(&mut self, host: HostContext) {
        self.classifier.set_host_context(host);
    }

    pub fn prefs(&self) -> &Preferences {
        self.store.prefs()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn stream(&self, id: StreamId) -> Option<&Stream> {
        self.registry.get(id)
    }

    pub fn stream_count(&self) -> usize {
        self.registry.len()
    }

    pub fn output_bus(&self) -> &OutputBus {
        &self.output
    }

    fn warn_status(&mut self, message: String) {
        warn!("{}", message);
        self.events
            .emit(EnhancerEvent::status(message.clone(), StatusLevel::Warning));
        self.last_warning = Some(message);
    }

    fn persist(&mut self, keys: &[PrefKey]) {
        if let Err(e) = self.store.persist(keys) {
            self.report_storage_error(e);
        }
    }

    fn persist_custom_preset(&mut self) {
        if let Err(e) = self.store.persist_custom_preset() {
            self.report_storage_error(e);
        }
    }

    fn report_storage_error(&mut self, e: StorageError) {
        self.warn_status(format!("Could not save preferences: {}", e));
    }

    fn emit_state_changes(&mut self) {
        let events = &mut self.events;
        self.registry.broadcast(|stream| {
            if let Some(state) = stream.take_state_change() {
                events.emit(EnhancerEvent::StreamStateChanged {
                    id: stream.id(),
                    state,
                });
            }
        });
    }

    /// Push the current preferences to every stream and the output bus
    fn apply_all(&mut self) {
        let gains = self.store.active_gains();
        let prefs = self.store.prefs();
        self.registry.broadcast(|stream| stream.apply(prefs, &gains));
        self.output
            .set_compressor_enabled(prefs.compressor_enabled());
    }

    /// Mutate preferences, persist `keys` and push the result to all streams
    fn update(&mut self, keys: &[PrefKey], f: impl FnOnce(&mut Preferences)) {
        f(self.store.prefs_mut());
        self.persist(keys);
        self.apply_all();
    }

    // ---- Lifecycle ----

    /// Attach a media source. Returns the existing id if the element is
    /// already attached.
    pub fn attach(&mut self, source: Box<dyn MediaSource>) -> StreamId {
        if let Some(id) = self.registry.find_by_key(source.source_key()) {
            return id;
        }
        let id = self.registry.insert(source);
        let gains = self.store.active_gains();
        let now = self.now;

        let result = match self.registry.get_mut(id) {
            Some(stream) => stream.build(self.sample_rate, self.store.prefs(), &gains, now),
            None => Ok(()),
        };
        if let Err(e) = result {
            self.warn_status(format!(
                "Stream {} plays without enhancement: {}",
                id, e
            ));
        }
        self.emit_state_changes();
        id
    }

    /// Schedule teardown on the next frame. Returns `false` when the stream
    /// is unknown or already scheduled.
    pub fn request_teardown(&mut self, id: StreamId) -> bool {
        let now = self.now;
        let armed = self
            .registry
            .get_mut(id)
            .is_some_and(|stream| stream.request_teardown(now));
        if armed {
            self.emit_state_changes();
        }
        armed
    }

    /// Destroy a stream immediately
    pub fn detach(&mut self, id: StreamId) -> Result<usize, ControllerError> {
        let mut stream = self
            .registry
            .remove(id)
            .ok_or(ControllerError::UnknownStream(id))?;
        let released = stream.destroy();
        if let Some(state) = stream.take_state_change() {
            self.events
                .emit(EnhancerEvent::StreamStateChanged { id, state });
        }
        Ok(released)
    }

    /// Destroy every stream; shared nodes stay alive
    pub fn cleanup_all(&mut self) -> usize {
        let mut released = 0;
        for id in self.registry.ids() {
            if let Ok(count) = self.detach(id) {
                released += count;
            }
        }
        debug!("Cleaned up all streams ({} stages released)", released);
        released
    }

    // ---- Frame tick ----

    /// Run one frame: bus analysis, classification, per-stream loops, then
    /// cleanup timers
    pub fn on_frame(&mut self, now: Duration, tap: &mut dyn MonitoringTap) {
        self.now = now;

        let bus_ok = match self.extractor.extract(tap) {
            Ok(features) => {
                self.analyze_content(&features.energies);
                true
            }
            Err(e) => {
                warn!("Monitoring tap unavailable: {}", e);
                false
            }
        };

        let gains = self.store.active_gains();
        let ctx = FrameContext {
            now,
            prefs: self.store.prefs(),
            eq_base: &gains,
            bus: bus_ok.then_some(&self.extractor),
        };
        self.registry.broadcast(|stream| stream.on_frame(&ctx));
        self.emit_state_changes();

        let due: Vec<StreamId> = self
            .registry
            .iter()
            .filter(|stream| stream.is_cleanup_due(now))
            .map(Stream::id)
            .collect();
        for id in due {
            if let Err(e) = self.detach(id) {
                warn!("Cleanup of stream {} failed: {}", id, e);
            }
        }
    }

    /// Feed one tick of bus energies to the classifier and apply the genre
    /// bundle when a transition commits
    pub fn analyze_content(&mut self, energies: &BandEnergies) -> Option<Genre> {
        let genre = self.classifier.observe(energies)?;
        let confidence = self.classifier.confidence();

        self.store.prefs_mut().apply_genre(genre);
        self.persist(&GenreDefaults::KEYS);
        self.apply_all();

        self.events
            .emit(EnhancerEvent::GenreDetected { genre, confidence });
        self.events
            .emit(EnhancerEvent::PresetChanged(self.store.prefs().preset()));
        Some(genre)
    }

    // ---- Audio ----

    /// Render `frames` frames of interleaved 5.1 into `bus`
    pub fn render(&mut self, bus: &mut [f32], frames: usize) {
        let len = (frames * SURROUND_CHANNELS).min(bus.len());
        let bus = &mut bus[..len];
        bus.fill(0.0);
        let frames = len / SURROUND_CHANNELS;
        for stream in self.registry.iter_mut() {
            stream.render(bus, frames);
        }
        self.output.process(bus);
    }

    // ---- UI operations ----

    pub fn set_enabled(&mut self, enabled: bool) {
        self.store.prefs_mut().set_enabled(enabled);
        self.persist(&[PrefKey::Enabled]);

        let prefs = self.store.prefs();
        self.registry.broadcast(|stream| {
            stream.set_enabled(enabled, prefs);
        });
        self.emit_state_changes();
        self.events.emit(EnhancerEvent::status(
            if enabled {
                "Enhancer enabled"
            } else {
                "Enhancer bypassed"
            },
            StatusLevel::Info,
        ));
    }

    /// Select a preset by name; unknown names are rejected
    pub fn set_preset(&mut self, name: &str) -> Result<(), ControllerError> {
        let preset: PresetName = name.parse()?;
        self.store.prefs_mut().set_preset(preset);
        self.persist(&[PrefKey::Preset]);

        let gains = self.store.active_gains();
        self.registry.broadcast(|stream| stream.set_eq_gains(&gains));
        self.events.emit(EnhancerEvent::PresetChanged(preset));
        Ok(())
    }

    pub fn set_gain(&mut self, channel: GainChannel, value: f32) {
        let key = match channel {
            GainChannel::Center => PrefKey::CenterGain,
            GainChannel::Surround => PrefKey::SurroundGain,
            GainChannel::Lfe => PrefKey::LfeGain,
            GainChannel::Master => PrefKey::Master,
        };
        self.update(&[key], |prefs| prefs.set_gain(channel, value));
    }

    /// Edit one custom band; live streams follow when the custom preset is active
    pub fn set_custom_preset_band(&mut self, index: usize, value: f32) -> Result<(), ControllerError> {
        self.store.set_custom_band(index, value)?;
        self.persist_custom_preset();
        self.refresh_custom_gains();
        Ok(())
    }

    /// Replace the whole custom preset and switch to it.
    ///
    /// Vectors that are not exactly nine bands long are rejected unchanged.
    pub fn set_custom_preset(&mut self, bands: &[f32]) -> Result<(), ControllerError> {
        self.store.set_custom_preset(bands)?;
        self.persist_custom_preset();

        self.store.prefs_mut().set_preset(PresetName::Custom);
        self.persist(&[PrefKey::Preset]);
        self.refresh_custom_gains();
        self.events
            .emit(EnhancerEvent::PresetChanged(PresetName::Custom));
        Ok(())
    }

    pub fn reset_custom_preset(&mut self) {
        self.store.reset_custom_preset();
        self.persist_custom_preset();
        self.refresh_custom_gains();
    }

    pub fn get_custom_preset(&self) -> [f32; BAND_COUNT] {
        *self.store.custom_preset().bands()
    }

    fn refresh_custom_gains(&mut self) {
        if !self.store.is_custom_active() {
            return;
        }
        let gains = self.store.active_gains();
        self.registry.broadcast(|stream| stream.set_eq_gains(&gains));
    }

    pub fn set_noise_reduction(&mut self, value: f32) {
        self.update(&[PrefKey::NoiseReduction], |prefs| {
            prefs.set_noise_reduction(value)
        });
    }

    pub fn set_dialogue_enhancement(&mut self, enabled: bool) {
        self.update(&[PrefKey::DialogueEnhancement], |prefs| {
            prefs.set_dialogue_enhancement(enabled)
        });
    }

    pub fn set_width_ms(&mut self, value: f32) {
        self.update(&[PrefKey::WidthMs], |prefs| prefs.set_width_ms(value));
    }

    pub fn set_crossfeed(&mut self, value: f32) {
        self.update(&[PrefKey::Crossfeed], |prefs| prefs.set_crossfeed(value));
    }

    pub fn set_bass_boost(&mut self, value: f32) {
        self.update(&[PrefKey::BassBoost], |prefs| prefs.set_bass_boost(value));
    }

    pub fn set_dynamic_range(&mut self, value: f32) {
        self.update(&[PrefKey::DynamicRange], |prefs| {
            prefs.set_dynamic_range(value)
        });
    }

    pub fn set_auto_eq(&mut self, enabled: bool) {
        self.update(&[PrefKey::AutoEq], |prefs| prefs.set_auto_eq(enabled));
    }

    pub fn set_loudness(&mut self, enabled: bool) {
        self.update(&[PrefKey::Loudness], |prefs| prefs.set_loudness(enabled));
    }

    pub fn set_spatial_enabled(&mut self, enabled: bool) {
        self.update(&[PrefKey::SpatialEnabled], |prefs| {
            prefs.set_spatial_enabled(enabled)
        });
    }

    pub fn set_compressor_enabled(&mut self, enabled: bool) {
        self.update(&[PrefKey::CompressorEnabled], |prefs| {
            prefs.set_compressor_enabled(enabled)
        });
    }

    pub fn set_distortion_control(&mut self, enabled: bool) {
        self.update(&[PrefKey::DistortionControl], |prefs| {
            prefs.set_distortion_control(enabled)
        });
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            sample_rate: self.sample_rate,
            stream_count: self.registry.len(),
            streams: self
                .registry
                .iter()
                .map(|stream| (stream.id(), stream.state()))
                .collect(),
            genre: self.classifier.label(),
            confidence: self.classifier.confidence(),
            prefs: self.store.prefs().clone(),
            custom_preset: self.get_custom_preset(),
            last_warning: self.last_warning.clone(),
        }
    }
}

//! Audio core for Halo - stereo media in, enhanced 5.1 out
//!
//! This crate provides the per-stream processing pipeline and its control:
//! - Upmix: Stereo to 5.1 with dialogue-band center and crossover LFE
//! - EQ: Nine-band equalizer that follows the bus spectrum
//! - Dynamics: Noise floor, auto-gain, bass shelf, soft clip, compressor
//! - Stream: Capture, bypass, DRM fallback and delayed cleanup per element
//! - Controller: Preferences, content classification and frame scheduling

mod chain;
mod controller;
mod dynamics;
pub mod effects;
mod eq;
mod error;
mod events;
mod layout;
mod prefs;
mod registry;
mod schedule;
mod storage;
mod store;
mod stream;
mod upmix;

pub use chain::ProcessingChain;
pub use controller::{EngineInfo, OutputBus, StatusSnapshot, StreamController};
pub use dynamics::{bass_shelf_db, ratio_for_dynamic_range, AutoGainConfig, DynamicsChain};
pub use eq::{auto_eq_targets, AdaptiveEqualizer};
pub use error::{CaptureError, ControllerError, PreferenceError, PresetError, StorageError};
pub use events::{EnhancerEvent, EventBus, StatusLevel};
pub use layout::{fold_down, SURROUND_CHANNELS};
pub use prefs::{
    CustomPreset, GainChannel, GenreDefaults, PrefKey, Preferences, PreferencesPatch, PresetName,
    BAND_COUNT, EQ_FREQUENCIES,
};
pub use registry::StreamRegistry;
pub use schedule::{CleanupReason, CleanupTimer, EndedWatch, FrameLoop};
pub use storage::{MemoryStorage, PreferenceStorage};
pub use store::ParameterStore;
pub use stream::{FrameContext, MediaSource, Stream, StreamId, StreamState};
pub use upmix::Upmixer;

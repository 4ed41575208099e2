//! Host-side storage for Halo - preference files and media decoding

mod config;
mod loader;

pub use config::{FilePreferenceStorage, PreferencesFile};
pub use loader::{resample_stereo, to_stereo, DecodedMedia, LoadError, MediaLoader, MediaMetadata};

use thiserror::Error;

use crate::StreamId;

/// Rejected preset operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PresetError {
    #[error("Preset \"{0}\" does not exist")]
    UnknownPreset(String),
    #[error("Preset must have exactly {expected} bands, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("EQ band index {0} out of range")]
    BandOutOfRange(usize),
}

/// A serialised preference value that failed validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreferenceError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Preference persistence failures
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed stored data: {0}")]
    Malformed(String),
}

/// The media source could not be routed through the processing graph
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Source is protected and cannot be captured")]
    Protected,
    #[error("Source capture failed: {0}")]
    Failed(String),
}

/// Errors returned by the stream controller API
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("No real-time audio engine available: {0}")]
    PlatformUnsupported(String),
    #[error("Unknown stream {0}")]
    UnknownStream(StreamId),
    #[error(transparent)]
    Preset(#[from] PresetError),
}

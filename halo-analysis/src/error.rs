use thiserror::Error;

/// Errors raised while pulling or analysing tap data
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("FFT size must be a power of two between 32 and 32768, got {0}")]
    InvalidFftSize(usize),
    #[error("Monitoring tap unavailable: {0}")]
    TapUnavailable(String),
    #[error("Buffer length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("Unknown genre \"{0}\"")]
    UnknownGenre(String),
}

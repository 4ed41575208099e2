//! Audio analysis for Halo
//!
//! Provides the monitoring tap abstraction, an FFT analyser that implements it,
//! band-energy feature extraction, content classification and per-stream
//! voice-activity estimation.

mod classifier;
mod error;
mod features;
mod spectrum;
mod tap;
mod voice;

pub use classifier::{
    ClassifierState, ContentClassifier, Genre, GenreScores, HostContext, HISTORY_LEN,
};
pub use error::AnalysisError;
pub use features::{
    avg_range, band_energy_around, rms, BandEnergies, SpectralFeatureExtractor, SpectralFeatures,
};
pub use spectrum::{SpectrumAnalyzer, BUS_FFT_SIZE, VOICE_FFT_SIZE};
pub use tap::MonitoringTap;
pub use voice::{wiener_gain, VoiceActivity, VoiceActivityEstimator};

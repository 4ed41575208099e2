//! DSP building blocks for the enhancer chain

mod biquad;
mod compressor;
mod delay;
mod filter;
mod shaper;
mod smoothing;

pub use biquad::{BiquadCoeffs, BiquadState, FilterShape};
pub use compressor::{db_to_linear, linear_to_db, Compressor, CompressorSettings};
pub use delay::DelayLine;
pub use filter::Filter;
pub use shaper::SoftClipper;
pub use smoothing::{SmoothedParam, FADE_TIME};

/// Trait for in-place audio effects.
///
/// Samples are interleaved; each effect is built for a fixed channel count.
pub trait Effect: Send {
    /// Process audio samples in place
    fn process(&mut self, samples: &mut [f32]);

    /// Reset effect state
    fn reset(&mut self);

    /// Check if effect is enabled
    fn is_enabled(&self) -> bool;

    /// Enable/disable the effect
    fn set_enabled(&mut self, enabled: bool);

    /// Get effect name
    fn name(&self) -> &'static str;
}

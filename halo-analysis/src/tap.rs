//! Pull interface onto an analysis point in the audio graph

use crate::AnalysisError;

/// A read-only view of the signal at some point of the graph.
///
/// Consumers pull snapshots; nothing is ever pushed through a tap by the
/// analysis side. Buffers passed in must be sized to
/// [`frequency_bin_count`](Self::frequency_bin_count) and
/// [`fft_size`](Self::fft_size) respectively.
pub trait MonitoringTap {
    /// Sample rate of the tapped signal in Hz
    fn sample_rate(&self) -> u32;

    /// Analysis window length in samples
    fn fft_size(&self) -> usize;

    /// Number of magnitude bins (`fft_size / 2`)
    fn frequency_bin_count(&self) -> usize {
        self.fft_size() / 2
    }

    /// Magnitude spectrum quantised to bytes over the tap's dB range
    fn byte_frequency_data(&mut self, out: &mut [u8]) -> Result<(), AnalysisError>;

    /// Most recent `fft_size` samples of the waveform
    fn float_time_domain_data(&mut self, out: &mut [f32]) -> Result<(), AnalysisError>;
}

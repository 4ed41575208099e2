//! In-memory media element for the demo host

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use halo_audio::{CaptureError, MediaSource};

/// Playback position shared between the audio callback and the control loop
#[derive(Debug, Clone, Default)]
pub struct PlaybackHandle {
    position: Arc<AtomicUsize>,
    ended: Arc<AtomicBool>,
}

impl PlaybackHandle {
    /// Frames played so far
    pub fn position(&self) -> usize {
        self.position.load(Ordering::Relaxed)
    }

    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Relaxed)
    }
}

/// A decoded stereo buffer played once from the start
pub struct BufferSource {
    key: u64,
    samples: Arc<Vec<f32>>,
    handle: PlaybackHandle,
    volume: f32,
    muted: bool,
}

impl BufferSource {
    pub fn new(key: u64, samples: Arc<Vec<f32>>) -> Self {
        Self {
            key,
            samples,
            handle: PlaybackHandle::default(),
            volume: 1.0,
            muted: false,
        }
    }

    pub fn handle(&self) -> PlaybackHandle {
        self.handle.clone()
    }
}

impl MediaSource for BufferSource {
    fn source_key(&self) -> u64 {
        self.key
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn capture(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn has_ended(&self) -> bool {
        self.handle.has_ended()
    }

    fn is_paused(&self) -> bool {
        false
    }

    fn take_error(&mut self) -> Option<String> {
        None
    }

    fn fill(&mut self, out: &mut [f32]) -> usize {
        let total = self.samples.len() / 2;
        let start = self.handle.position().min(total);
        let frames = (out.len() / 2).min(total - start);

        out[..frames * 2].copy_from_slice(&self.samples[start * 2..(start + frames) * 2]);
        self.handle.position.store(start + frames, Ordering::Relaxed);
        if start + frames >= total {
            self.handle.ended.store(true, Ordering::Relaxed);
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_advances_and_ends() {
        let samples = Arc::new(vec![0.5; 2 * 100]);
        let mut source = BufferSource::new(1, samples);
        let handle = source.handle();

        let mut out = vec![0.0; 2 * 64];
        assert_eq!(source.fill(&mut out), 64);
        assert_eq!(handle.position(), 64);
        assert!(!handle.has_ended());

        assert_eq!(source.fill(&mut out), 36);
        assert!(source.has_ended());
        assert_eq!(source.fill(&mut out), 0);
    }

    #[test]
    fn test_volume_is_clamped() {
        let mut source = BufferSource::new(1, Arc::new(Vec::new()));
        source.set_volume(3.0);
        assert_eq!(source.volume(), 1.0);
    }
}

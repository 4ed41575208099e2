//! Frame-driven loops and delayed cleanup timers
//!
//! All timing is expressed against the `now` the host passes to each frame
//! tick, so nothing here reads a clock.

use std::time::Duration;

use tracing::{debug, warn};

/// A per-frame callback that stops itself.
///
/// The continuation predicate is evaluated at the top of every tick; once it
/// fails, or the body returns an error, the loop is stopped for good.
#[derive(Debug)]
pub struct FrameLoop {
    name: &'static str,
    running: bool,
}

impl FrameLoop {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: false,
        }
    }

    pub fn start(&mut self) {
        if !self.running {
            debug!("Starting {} loop", self.name);
        }
        self.running = true;
    }

    pub fn stop(&mut self) {
        if self.running {
            debug!("Stopping {} loop", self.name);
        }
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Run one tick. Returns `true` while the loop keeps running.
    pub fn tick<E, F>(&mut self, should_continue: bool, body: F) -> bool
    where
        E: std::fmt::Display,
        F: FnOnce() -> Result<(), E>,
    {
        if !self.running {
            return false;
        }
        if !should_continue {
            self.stop();
            return false;
        }
        if let Err(e) = body() {
            warn!("{} loop failed: {}", self.name, e);
            self.stop();
            return false;
        }
        true
    }
}

/// Why a cleanup was armed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupReason {
    /// Capture refused; playback restored natively
    Drm,
    MediaError,
    /// Still ended and playing after the end-of-playback watch
    Ended,
    Teardown,
}

impl CleanupReason {
    /// Grace period before the stream is destroyed
    pub fn delay(self) -> Duration {
        match self {
            CleanupReason::Drm => Duration::from_secs(5),
            CleanupReason::MediaError => Duration::from_secs(10),
            CleanupReason::Ended => Duration::from_secs(30),
            CleanupReason::Teardown => Duration::ZERO,
        }
    }
}

/// At most one pending cleanup; re-arming while pending is a no-op
#[derive(Debug, Default)]
pub struct CleanupTimer {
    pending: Option<(Duration, CleanupReason)>,
}

impl CleanupTimer {
    /// Arm for `reason` relative to `now`. Returns `false` if already armed.
    pub fn arm(&mut self, now: Duration, reason: CleanupReason) -> bool {
        if self.pending.is_some() {
            return false;
        }
        self.pending = Some((now + reason.delay(), reason));
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn reason(&self) -> Option<CleanupReason> {
        self.pending.map(|(_, reason)| reason)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.pending.map(|(deadline, _)| deadline)
    }

    /// True once `now` has reached the deadline
    pub fn is_due(&self, now: Duration) -> bool {
        matches!(self.pending, Some((deadline, _)) if now >= deadline)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

/// Time a stream must stay ended before cleanup is armed
pub const ENDED_WATCH: Duration = Duration::from_secs(30);

/// Watches for a stream that stays ended-but-not-paused
#[derive(Debug, Default)]
pub struct EndedWatch {
    deadline: Option<Duration>,
}

impl EndedWatch {
    /// Restart the watch from `now`
    pub fn restart(&mut self, now: Duration) {
        self.deadline = Some(now + ENDED_WATCH);
    }

    pub fn is_watching(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consume the watch once it expires; `true` means the stream should be
    /// re-checked and cleanup armed if it is still ended
    pub fn poll(&mut self, now: Duration) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

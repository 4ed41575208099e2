//! Notifications from the core to UI observers

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use halo_analysis::Genre;

use crate::prefs::PresetName;
use crate::stream::{StreamId, StreamState};

/// Capacity of each observer's queue
const EVENT_QUEUE_SIZE: usize = 256;

/// Severity of a status message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Ok,
    Warning,
    Error,
}

/// Events delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum EnhancerEvent {
    /// Active preset changed (by the user or the classifier)
    PresetChanged(PresetName),
    /// Advisory message for the user
    Status { message: String, level: StatusLevel },
    /// Classifier committed a new content label
    GenreDetected { genre: Genre, confidence: f32 },
    /// A stream moved to a new lifecycle state
    StreamStateChanged { id: StreamId, state: StreamState },
}

impl EnhancerEvent {
    pub fn status(message: impl Into<String>, level: StatusLevel) -> Self {
        EnhancerEvent::Status {
            message: message.into(),
            level,
        }
    }
}

/// Fan-out of events to every live subscriber
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Sender<EnhancerEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer
    pub fn subscribe(&mut self) -> Receiver<EnhancerEvent> {
        let (tx, rx) = bounded(EVENT_QUEUE_SIZE);
        self.subscribers.push(tx);
        rx
    }

    /// Deliver without blocking; full queues drop the event, closed ones are pruned
    pub fn emit(&mut self, event: EnhancerEvent) {
        self.subscribers
            .retain(|tx| match tx.try_send(event.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_subscribers_receive() {
        let mut bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.emit(EnhancerEvent::PresetChanged(PresetName::Music));

        assert_eq!(a.try_recv(), Ok(EnhancerEvent::PresetChanged(PresetName::Music)));
        assert_eq!(b.try_recv(), Ok(EnhancerEvent::PresetChanged(PresetName::Music)));
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let mut bus = EventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        bus.emit(EnhancerEvent::status("hello", StatusLevel::Info));

        assert_eq!(bus.subscriber_count(), 1);
        assert!(keep.try_recv().is_ok());
    }

    #[test]
    fn test_full_queue_does_not_block() {
        let mut bus = EventBus::new();
        let rx = bus.subscribe();
        for _ in 0..(EVENT_QUEUE_SIZE + 10) {
            bus.emit(EnhancerEvent::status("tick", StatusLevel::Info));
        }
        assert_eq!(rx.len(), EVENT_QUEUE_SIZE);
        assert_eq!(bus.subscriber_count(), 1);
    }
}

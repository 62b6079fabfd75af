//! Signals to the rendering layer.

use calsync_core::CalendarEvent;
use tokio::sync::broadcast;
use tracing::trace;

/// Fire-and-forget notifications about displayed events.
pub trait EventEmitter: Send + Sync {
    fn emit_created(&self, event: &CalendarEvent);
    fn emit_modified(&self, event: &CalendarEvent);
    /// `id` is [`CalendarEvent::id`] of the removed event.
    fn emit_removed(&self, id: &str);
}

/// A rendering signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiSignal {
    Created(CalendarEvent),
    Modified(CalendarEvent),
    Removed(String),
}

/// Emitter fanning signals out over a tokio broadcast channel.
///
/// Signals sent while nobody subscribes are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastEmitter {
    sender: broadcast::Sender<UiSignal>,
}

impl BroadcastEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiSignal> {
        self.sender.subscribe()
    }

    fn send(&self, signal: UiSignal) {
        if self.sender.send(signal).is_err() {
            trace!("No rendering subscriber");
        }
    }
}

impl Default for BroadcastEmitter {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventEmitter for BroadcastEmitter {
    fn emit_created(&self, event: &CalendarEvent) {
        self.send(UiSignal::Created(event.clone()));
    }

    fn emit_modified(&self, event: &CalendarEvent) {
        self.send(UiSignal::Modified(event.clone()));
    }

    fn emit_removed(&self, id: &str) {
        self.send(UiSignal::Removed(id.to_string()));
    }
}

//! Registration ledger.
//!
//! Records the optimistic deltas the engine applied locally, so rendering code
//! can overlay them on events fetched from the server. One delta per event
//! uid; the latest registration wins.

use std::collections::HashMap;
use std::sync::Arc;

use calsync_core::CalendarEvent;
use tokio::sync::RwLock;
use tracing::debug;

/// Ledger shared between the engine (single writer) and rendering readers.
pub type SharedLedger = Arc<RwLock<RegistrationLedger>>;

/// Creates an empty shared ledger.
pub fn shared_ledger() -> SharedLedger {
    Arc::new(RwLock::new(RegistrationLedger::new()))
}

/// Kind of local delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    Add,
    Update,
    Delete,
}

/// A delta recorded for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub kind: DeltaKind,
    pub event: CalendarEvent,
    /// True while the write sits behind a grace period.
    pub pending: bool,
}

/// Local deltas keyed by event uid.
#[derive(Debug, Default)]
pub struct RegistrationLedger {
    entries: HashMap<String, Registration>,
}

impl RegistrationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_add(&mut self, event: &CalendarEvent, pending: bool) {
        self.register(DeltaKind::Add, event, pending);
    }

    pub fn register_update(&mut self, event: &CalendarEvent, pending: bool) {
        self.register(DeltaKind::Update, event, pending);
    }

    pub fn register_delete(&mut self, event: &CalendarEvent, pending: bool) {
        self.register(DeltaKind::Delete, event, pending);
    }

    fn register(&mut self, kind: DeltaKind, event: &CalendarEvent, pending: bool) {
        debug!(uid = %event.uid, kind = ?kind, pending = pending, "Registered delta");
        self.entries.insert(
            event.uid.clone(),
            Registration {
                kind,
                event: event.clone(),
                pending,
            },
        );
    }

    /// Removes the delta of an event.
    pub fn delete_registration(&mut self, uid: &str) -> Option<Registration> {
        let removed = self.entries.remove(uid);
        if removed.is_some() {
            debug!(uid = %uid, "Removed delta");
        }
        removed
    }

    /// Marks the delta of an event as committed by the server.
    ///
    /// Returns false if the event has no delta.
    pub fn mark_committed(&mut self, uid: &str) -> bool {
        match self.entries.get_mut(uid) {
            Some(registration) => {
                registration.pending = false;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, uid: &str) -> Option<&Registration> {
        self.entries.get(uid)
    }

    /// Returns the deltas still awaiting commit.
    pub fn pending(&self) -> Vec<&Registration> {
        self.entries.values().filter(|r| r.pending).collect()
    }

    /// Overlays the deltas on a fetched event list.
    ///
    /// Events with an update or delete delta are replaced (all VEVENTs of the
    /// uid); added and updated events are appended.
    pub fn apply(&self, events: Vec<CalendarEvent>) -> Vec<CalendarEvent> {
        let mut result: Vec<CalendarEvent> = events
            .into_iter()
            .filter(|event| match self.entries.get(&event.uid) {
                Some(r) => r.kind == DeltaKind::Add && !r.pending,
                None => true,
            })
            .collect();

        for registration in self.entries.values() {
            let already_listed = result.iter().any(|e| e.uid == registration.event.uid);
            match registration.kind {
                DeltaKind::Add if !already_listed => result.push(registration.event.clone()),
                DeltaKind::Update => result.push(registration.event.clone()),
                _ => {}
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        let count = self.entries.len();
        self.entries.clear();
        debug!(count = count, "Cleared ledger");
    }
}

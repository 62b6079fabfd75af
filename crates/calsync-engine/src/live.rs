//! Live update hub.
//!
//! Fans "event updated" payloads out to rooms keyed by attendee address, so
//! every attendee's session hears about changes made by someone else. The hub
//! does nothing until [`LiveHub::init`] is called.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use calsync_core::normalize_address;
use calsync_transport::{RawEvent, parse_master};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult, Operation};

type Rooms = HashMap<String, broadcast::Sender<RawEvent>>;

/// Hub of per-attendee update rooms.
#[derive(Debug)]
pub struct LiveHub {
    rooms: Mutex<Option<Rooms>>,
    capacity: usize,
}

impl Default for LiveHub {
    fn default() -> Self {
        Self::new(32)
    }
}

impl LiveHub {
    /// Creates an uninitialized hub; each room buffers `capacity` updates.
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Mutex::new(None),
            capacity: capacity.max(1),
        }
    }

    fn rooms(&self) -> MutexGuard<'_, Option<Rooms>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the hub. Returns false if it was already started.
    pub fn init(&self) -> bool {
        let mut rooms = self.rooms();
        if rooms.is_some() {
            warn!("The live update hub is already initialized");
            return false;
        }
        *rooms = Some(HashMap::new());
        info!("Live update hub initialized");
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.rooms().is_some()
    }

    /// Joins the room of an address.
    pub fn subscribe(&self, room: &str) -> EngineResult<broadcast::Receiver<RawEvent>> {
        let mut guard = self.rooms();
        let rooms = guard.as_mut().ok_or_else(not_initialized)?;
        let room = normalize_address(room);
        debug!(room = %room, "Joining room");
        let receiver = match rooms.get(&room) {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(self.capacity);
                rooms.insert(room, sender);
                receiver
            }
        };
        Ok(receiver)
    }

    /// Closes the room of an address; its receivers see the channel closed.
    ///
    /// Returns false if the room did not exist.
    pub fn unsubscribe(&self, room: &str) -> EngineResult<bool> {
        let mut guard = self.rooms();
        let rooms = guard.as_mut().ok_or_else(not_initialized)?;
        let room = normalize_address(room);
        debug!(room = %room, "Leaving room");
        Ok(rooms.remove(&room).is_some())
    }

    /// Sends an updated event to the room of each of its attendees.
    ///
    /// Returns the number of rooms reached. Attendees without a listener are
    /// skipped.
    pub fn publish_event_updated(&self, raw: &RawEvent) -> EngineResult<usize> {
        let event = parse_master(raw)
            .map_err(|e| EngineError::transport(Operation::Publish, raw.path.clone(), e))?;

        let guard = self.rooms();
        let rooms = guard.as_ref().ok_or_else(not_initialized)?;

        let mut reached = 0;
        for attendee in &event.attendees {
            match rooms.get(&attendee.email) {
                Some(sender) if sender.send(raw.clone()).is_ok() => reached += 1,
                _ => debug!(attendee = %attendee.email, "No listener for event update"),
            }
        }
        debug!(uid = %event.uid, reached = reached, "Published event update");
        Ok(reached)
    }
}

fn not_initialized() -> EngineError {
    EngineError::live_hub("the live update hub is not initialized")
}

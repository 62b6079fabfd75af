//! Cache of recurring masters with TTL support.
//!
//! Instance edits need the current master of their series. Masters the
//! engine just wrote are kept here for a while so the next instance edit does
//! not refetch them.

use std::collections::HashMap;
use std::time::Duration;

use calsync_core::CalendarEvent;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
struct CachedMaster {
    event: CalendarEvent,
    expires_at: Instant,
}

impl CachedMaster {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Recurring masters keyed by resource path.
#[derive(Debug)]
pub struct MasterEventCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedMaster>>,
}

impl Default for MasterEventCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl MasterEventCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stores a master under its path. Events without a path are ignored.
    pub async fn save(&self, event: &CalendarEvent) {
        let Some(ref path) = event.path else {
            trace!(uid = %event.uid, "Master without path not cached");
            return;
        };

        self.entries.write().await.insert(
            path.clone(),
            CachedMaster {
                event: event.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        debug!(path = %path, uid = %event.uid, "Cached master event");
    }

    /// Returns a copy of the master stored under `path`, if not expired.
    pub async fn get(&self, path: &str) -> Option<CalendarEvent> {
        self.entries
            .read()
            .await
            .get(path)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.event.clone())
    }

    pub async fn remove(&self, path: &str) -> Option<CalendarEvent> {
        let removed = self.entries.write().await.remove(path);
        if removed.is_some() {
            debug!(path = %path, "Removed cached master");
        }
        removed.map(|entry| entry.event)
    }

    /// Drops expired entries and returns how many were dropped.
    pub async fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(count = evicted, "Evicted expired masters");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

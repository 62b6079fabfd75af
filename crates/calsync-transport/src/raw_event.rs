//! Wire representation of a stored calendar resource.

use calsync_core::VersionTag;
use serde::{Deserialize, Serialize};

/// A calendar resource as returned by the server, before decoding.
///
/// `data` is the iCalendar text of the whole resource; a recurring series is
/// one resource holding the master and its overridden instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Server path of the resource.
    pub path: String,
    /// Version tag of the stored revision, when the server sent one.
    pub etag: Option<VersionTag>,
    /// iCalendar payload.
    pub data: String,
}

impl RawEvent {
    pub fn new(path: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            etag: None,
            data: data.into(),
        }
    }

    /// Builder method to set the version tag.
    pub fn with_etag(mut self, etag: VersionTag) -> Self {
        self.etag = Some(etag);
        self
    }
}

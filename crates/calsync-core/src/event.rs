//! Event types for calendar events.
//!
//! This module provides the value types the synchronization engine works on:
//! - [`CalendarEvent`]: a single event, a recurring master or one of its instances
//! - [`VersionTag`]: the server revision of a stored event resource (ETag)
//! - [`TaskId`]: the server-side identifier of a deferred (grace period) write
//! - [`Attendee`] and [`PartStat`]: participants and their participation status

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::recurrence::Recurrence;
use crate::time::EventTime;

/// Opaque identifier of a stored event revision.
///
/// Built from an HTTP `ETag` header value; surrounding quotes and the weak
/// validator prefix are stripped so tags compare by their content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionTag(String);

impl VersionTag {
    /// Creates a version tag from a raw header or property value.
    pub fn new(value: impl AsRef<str>) -> Self {
        let value = value.as_ref().trim();
        let value = value.strip_prefix("W/").unwrap_or(value);
        Self(value.trim_matches('"').to_string())
    }

    /// Returns the tag content without quotes.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the tag formatted for an `If-Match` header.
    pub fn header_value(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a pending grace period task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a task id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Participation status of an attendee (iCalendar `PARTSTAT`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartStat {
    /// The attendee has not responded yet.
    #[default]
    NeedsAction,
    /// The attendee has accepted the invitation.
    Accepted,
    /// The attendee has declined the invitation.
    Declined,
    /// The attendee has tentatively accepted.
    Tentative,
    /// The attendee delegated participation.
    Delegated,
}

impl PartStat {
    /// Returns the iCalendar spelling of this status.
    pub fn as_ics_str(&self) -> &'static str {
        match self {
            Self::NeedsAction => "NEEDS-ACTION",
            Self::Accepted => "ACCEPTED",
            Self::Declined => "DECLINED",
            Self::Tentative => "TENTATIVE",
            Self::Delegated => "DELEGATED",
        }
    }

    /// Parses an iCalendar `PARTSTAT` value (case-insensitive).
    pub fn from_ics_str(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "NEEDS-ACTION" => Some(Self::NeedsAction),
            "ACCEPTED" => Some(Self::Accepted),
            "DECLINED" => Some(Self::Declined),
            "TENTATIVE" => Some(Self::Tentative),
            "DELEGATED" => Some(Self::Delegated),
            _ => None,
        }
    }
}

impl fmt::Display for PartStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ics_str())
    }
}

/// Normalizes a calendar user address for comparison.
///
/// Lowercases and removes the `mailto:` scheme.
pub fn normalize_address(address: &str) -> String {
    let lower = address.trim().to_lowercase();
    match lower.strip_prefix("mailto:") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}

/// An attendee (or the organizer) of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    /// The attendee's email address, without the `mailto:` scheme.
    pub email: String,
    /// The attendee's display name (`CN`), if available.
    pub name: Option<String>,
    /// The attendee's participation status.
    pub partstat: PartStat,
}

impl Attendee {
    /// Creates an attendee that has not responded yet.
    pub fn new(email: impl AsRef<str>) -> Self {
        Self {
            email: normalize_address(email.as_ref()),
            name: None,
            partstat: PartStat::NeedsAction,
        }
    }

    /// Builder method to set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder method to set the participation status.
    pub fn with_partstat(mut self, partstat: PartStat) -> Self {
        self.partstat = partstat;
        self
    }

    /// Returns true if this attendee has the given address.
    pub fn has_address(&self, address: &str) -> bool {
        self.email == normalize_address(address)
    }
}

/// The variant of an event with respect to recurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A non-recurring event.
    Single,
    /// The master of a recurring series.
    Master,
    /// One occurrence of a recurring series.
    Instance,
}

/// A calendar event.
///
/// The same type represents non-recurring events, recurring masters (with
/// `recurrence` set and overridden occurrences in `exceptions`) and
/// instances (with `recurrence_id` set). Cloning produces an independent
/// value, which is what rollback snapshots rely on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Stable unique identifier (`UID`).
    pub uid: String,
    /// Server path of the resource holding this event.
    pub path: Option<String>,
    /// Version tag of the stored resource, `None` until first committed.
    pub etag: Option<VersionTag>,
    /// The event title (`SUMMARY`).
    pub title: String,
    /// When the event starts.
    pub start: EventTime,
    /// When the event ends.
    pub end: EventTime,
    /// The event location.
    pub location: Option<String>,
    /// The event description.
    pub description: Option<String>,
    /// Revision sequence number (`SEQUENCE`).
    pub sequence: u32,
    /// The organizer.
    pub organizer: Option<Attendee>,
    /// The attendees.
    pub attendees: Vec<Attendee>,
    /// Recurrence rule, set on masters.
    pub recurrence: Option<Recurrence>,
    /// The occurrence this instance stands for, set on instances.
    pub recurrence_id: Option<EventTime>,
    /// Overridden instances of a master.
    pub exceptions: Vec<CalendarEvent>,
    /// Whether this instance is stored as an override of its master.
    pub is_exception: bool,
    /// The grace period task currently pending for this event.
    pub grace_period_task_id: Option<TaskId>,
    /// Properties not modelled above, kept for round-tripping.
    pub extra_properties: Vec<(String, String)>,
}

impl CalendarEvent {
    /// Creates a new non-recurring event.
    pub fn new(uid: impl Into<String>, title: impl Into<String>, start: EventTime, end: EventTime) -> Self {
        Self {
            uid: uid.into(),
            path: None,
            etag: None,
            title: title.into(),
            start,
            end,
            location: None,
            description: None,
            sequence: 0,
            organizer: None,
            attendees: Vec::new(),
            recurrence: None,
            recurrence_id: None,
            exceptions: Vec::new(),
            is_exception: false,
            grace_period_task_id: None,
            extra_properties: Vec::new(),
        }
    }

    /// Identifier used by the rendering layer.
    ///
    /// Instances are suffixed with their recurrence id so every occurrence of a
    /// series gets its own identifier.
    pub fn id(&self) -> String {
        match self.recurrence_id {
            Some(ref rid) => format!("{}_{}", self.uid, rid.to_ics_value()),
            None => self.uid.clone(),
        }
    }

    /// Returns the recurrence variant of this event.
    pub fn kind(&self) -> EventKind {
        if self.recurrence_id.is_some() {
            EventKind::Instance
        } else if self.recurrence.is_some() {
            EventKind::Master
        } else {
            EventKind::Single
        }
    }

    /// Returns true if this event is one occurrence of a recurring series.
    pub fn is_instance(&self) -> bool {
        self.kind() == EventKind::Instance
    }

    /// Returns true if this event belongs to a recurring series.
    pub fn is_recurring(&self) -> bool {
        self.kind() != EventKind::Single
    }

    /// Sets the participation status of attendees.
    ///
    /// With `emails` set, only attendees with one of those addresses are
    /// updated; otherwise every attendee is. Returns true if at least one
    /// status actually changed.
    pub fn change_participation(&mut self, status: PartStat, emails: Option<&[String]>) -> bool {
        let mut changed = false;
        for attendee in &mut self.attendees {
            let targeted = emails.is_none_or(|list| list.iter().any(|e| attendee.has_address(e)));
            if targeted && attendee.partstat != status {
                attendee.partstat = status;
                changed = true;
            }
        }
        changed
    }

    /// Returns the attendee with the given address.
    pub fn attendee(&self, address: &str) -> Option<&Attendee> {
        self.attendees.iter().find(|a| a.has_address(address))
    }

    /// Builder method to set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder method to set the organizer.
    pub fn with_organizer(mut self, organizer: Attendee) -> Self {
        self.organizer = Some(organizer);
        self
    }

    /// Builder method to add an attendee.
    pub fn with_attendee(mut self, attendee: Attendee) -> Self {
        self.attendees.push(attendee);
        self
    }

    /// Builder method to set the recurrence rule, turning the event into a master.
    pub fn with_recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = Some(recurrence);
        self
    }

    /// Builder method to set the server location.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Builder method to set the version tag.
    pub fn with_etag(mut self, etag: VersionTag) -> Self {
        self.etag = Some(etag);
        self
    }

    /// Builder method to set the sequence number.
    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }
}

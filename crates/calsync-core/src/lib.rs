//! Core types: events, version tags, time, recurrence, tracing

pub mod event;
pub mod recurrence;
pub mod time;
pub mod tracing;

pub use event::{
    normalize_address, Attendee, CalendarEvent, EventKind, PartStat, TaskId, VersionTag,
};
pub use recurrence::{Recurrence, RecurrenceError};
pub use time::{EventTime, TimeWindow};
pub use tracing::{init_tracing, TracingConfig, TracingError, TracingOutputFormat};

//! Calendar transport: the resource and grace period task APIs the engine
//! writes through, the iCalendar codec, and a CalDAV implementation.

#[cfg(feature = "caldav")]
pub mod caldav;
pub mod error;
pub mod ics;
pub mod raw_event;
pub mod transport;

pub use error::{TransportError, TransportErrorCode, TransportResult};
pub use ics::{generate_ics, parse_ics_content, parse_master};
pub use raw_event::RawEvent;
pub use transport::{
    BoxFuture, CalendarTransport, CreateOptions, GracePeriodApi, ParticipationResponse,
    SearchQuery, WriteOutcome,
};

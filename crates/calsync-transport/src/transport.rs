//! Transport trait definitions.
//!
//! [`CalendarTransport`] is the calendar resource API the engine writes
//! through, and [`GracePeriodApi`] is the server-side task API used to cancel
//! deferred writes. Both are object safe so the engine can hold them as
//! `Arc<dyn ...>` and tests can swap in scripted doubles.

use std::future::Future;
use std::pin::Pin;

use calsync_core::{TaskId, TimeWindow, VersionTag};

use crate::error::TransportResult;
use crate::raw_event::RawEvent;

/// A boxed future for async trait methods.
///
/// Boxed futures keep the traits object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of a write call.
///
/// The server either applies the write right away or queues it behind a grace
/// period and answers with the id of the pending task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write is final. Carries the stored resource when the server
    /// returned one.
    Immediate(Option<RawEvent>),
    /// The write is queued; it commits when the task's grace period elapses.
    Deferred(TaskId),
}

impl WriteOutcome {
    /// Returns the pending task id of a deferred write.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Self::Deferred(id) => Some(id),
            Self::Immediate(_) => None,
        }
    }
}

/// Options for creating an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Ask the server to defer the write behind a grace period.
    pub grace_period: bool,
}

impl CreateOptions {
    pub fn with_grace_period() -> Self {
        Self { grace_period: true }
    }
}

/// Full-text search parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub limit: usize,
    pub offset: usize,
}

impl SearchQuery {
    pub const DEFAULT_LIMIT: usize = 20;

    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Response to a participation change.
///
/// A version conflict is reported as a
/// [`TransportError`](crate::TransportError), not as a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipationResponse {
    /// HTTP-style status: 200 carries the updated event, 204 carries nothing.
    pub status: u16,
    /// iCalendar payload of the updated event (status 200).
    pub data: Option<String>,
    /// Version tag of the updated event, when sent.
    pub etag: Option<VersionTag>,
}

impl ParticipationResponse {
    pub fn ok(data: impl Into<String>, etag: Option<VersionTag>) -> Self {
        Self {
            status: 200,
            data: Some(data.into()),
            etag,
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            data: None,
            etag: None,
        }
    }
}

/// The calendar resource API.
pub trait CalendarTransport: Send + Sync {
    /// Returns a short name for logging (e.g. "caldav").
    fn name(&self) -> &str;

    /// Lists the resources of a calendar having events inside the window.
    fn list_events<'a>(
        &'a self,
        calendar_path: &'a str,
        window: &'a TimeWindow,
        timezone: Option<&'a str>,
    ) -> BoxFuture<'a, TransportResult<Vec<RawEvent>>>;

    /// Searches the events of a calendar.
    fn search_events<'a>(
        &'a self,
        calendar_id: &'a str,
        query: &'a SearchQuery,
    ) -> BoxFuture<'a, TransportResult<Vec<RawEvent>>>;

    /// Fetches one resource with its current version tag.
    fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, TransportResult<RawEvent>>;

    /// Stores a new resource.
    fn create<'a>(
        &'a self,
        path: &'a str,
        payload: String,
        options: CreateOptions,
    ) -> BoxFuture<'a, TransportResult<WriteOutcome>>;

    /// Replaces a resource, conditional on `etag` when given.
    fn modify<'a>(
        &'a self,
        path: &'a str,
        payload: String,
        etag: Option<&'a VersionTag>,
    ) -> BoxFuture<'a, TransportResult<WriteOutcome>>;

    /// Deletes a resource, conditional on `etag` when given.
    fn remove<'a>(
        &'a self,
        path: &'a str,
        etag: Option<&'a VersionTag>,
    ) -> BoxFuture<'a, TransportResult<WriteOutcome>>;

    /// Stores a participation change, conditional on `etag` when given.
    fn change_participation<'a>(
        &'a self,
        path: &'a str,
        payload: String,
        etag: Option<&'a VersionTag>,
    ) -> BoxFuture<'a, TransportResult<ParticipationResponse>>;
}

/// The server-side grace period task API.
pub trait GracePeriodApi: Send + Sync {
    /// Cancels a pending task.
    ///
    /// A task that already ran is reported as not found (or gone).
    fn cancel_task<'a>(&'a self, task_id: &'a TaskId) -> BoxFuture<'a, TransportResult<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_outcome_task_id() {
        let deferred = WriteOutcome::Deferred(TaskId::new("T1"));
        assert_eq!(deferred.task_id(), Some(&TaskId::new("T1")));
        assert_eq!(WriteOutcome::Immediate(None).task_id(), None);
    }

    #[test]
    fn search_query_defaults() {
        let query = SearchQuery::new("standup");
        assert_eq!(query.limit, 20);
        assert_eq!(query.offset, 0);

        let query = query.with_limit(5).with_offset(10);
        assert_eq!((query.limit, query.offset), (5, 10));
    }
}

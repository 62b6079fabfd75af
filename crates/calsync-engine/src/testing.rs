//! In-memory doubles for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use calsync_core::{CalendarEvent, TaskId, TimeWindow, VersionTag};
use calsync_transport::{
    BoxFuture, CalendarTransport, CreateOptions, GracePeriodApi, ParticipationResponse, RawEvent,
    SearchQuery, TransportError, TransportErrorCode, TransportResult, WriteOutcome,
    generate_ics,
};

use crate::emitter::{EventEmitter, UiSignal};
use crate::notify::UserNotifier;

/// A call received by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(String),
    Search(String),
    Get(String),
    Create {
        path: String,
        payload: String,
        grace_period: bool,
    },
    Modify {
        path: String,
        payload: String,
        etag: Option<VersionTag>,
    },
    Remove {
        path: String,
        etag: Option<VersionTag>,
    },
    Participation {
        path: String,
        payload: String,
        etag: Option<VersionTag>,
    },
}

impl Call {
    pub fn etag(&self) -> Option<&VersionTag> {
        match self {
            Self::Modify { etag, .. } | Self::Remove { etag, .. } | Self::Participation { etag, .. } => {
                etag.as_ref()
            }
            _ => None,
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, Self::List(_) | Self::Search(_) | Self::Get(_))
    }
}

/// Scripted answer: errors are rebuilt on every use.
#[derive(Debug, Clone)]
enum Scripted<T> {
    Ok(T),
    Err(TransportErrorCode, String),
}

impl<T> Scripted<T> {
    fn from_result(result: TransportResult<T>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(e) => Self::Err(e.code(), e.message().to_string()),
        }
    }

    fn into_result(self) -> TransportResult<T> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Err(code, message) => {
                let err = TransportError::new(code, message);
                Err(match code {
                    TransportErrorCode::VersionConflict => err.with_status(412),
                    TransportErrorCode::NotFound => err.with_status(404),
                    _ => err,
                })
            }
        }
    }
}

/// Transport answering from an in-memory store and scripted write results.
///
/// Writes without a scripted answer succeed immediately. `get` serves the
/// stored resources.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    resources: Mutex<HashMap<String, RawEvent>>,
    writes: Mutex<VecDeque<Scripted<WriteOutcome>>>,
    participations: Mutex<VecDeque<Scripted<ParticipationResponse>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an event as the server copy of its path.
    pub fn store(&self, event: &CalendarEvent, etag: &str) {
        let path = event.path.clone().unwrap_or_default();
        let raw = RawEvent::new(path.clone(), generate_ics(event)).with_etag(VersionTag::new(etag));
        self.resources.lock().unwrap().insert(path, raw);
    }

    /// Queues the answer to the next create/modify/remove.
    pub fn push_write(&self, result: TransportResult<WriteOutcome>) {
        self.writes
            .lock()
            .unwrap()
            .push_back(Scripted::from_result(result));
    }

    pub fn push_deferred(&self, task_id: &str) {
        self.push_write(Ok(WriteOutcome::Deferred(TaskId::new(task_id))));
    }

    pub fn push_conflict(&self) {
        self.push_write(Err(TransportError::version_conflict("precondition failed")));
    }

    /// Queues the answer to the next participation change.
    pub fn push_participation(&self, result: TransportResult<ParticipationResponse>) {
        self.participations
            .lock()
            .unwrap()
            .push_back(Scripted::from_result(result));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_write).collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_write(&self) -> TransportResult<WriteOutcome> {
        self.writes
            .lock()
            .unwrap()
            .pop_front()
            .map(Scripted::into_result)
            .unwrap_or(Ok(WriteOutcome::Immediate(None)))
    }
}

impl CalendarTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    fn list_events<'a>(
        &'a self,
        calendar_path: &'a str,
        _window: &'a TimeWindow,
        _timezone: Option<&'a str>,
    ) -> BoxFuture<'a, TransportResult<Vec<RawEvent>>> {
        Box::pin(async move {
            self.record(Call::List(calendar_path.to_string()));
            let prefix = calendar_path.trim_end_matches('/');
            let mut events: Vec<RawEvent> = self
                .resources
                .lock()
                .unwrap()
                .values()
                .filter(|raw| raw.path.starts_with(prefix))
                .cloned()
                .collect();
            events.sort_by(|a, b| a.path.cmp(&b.path));
            Ok(events)
        })
    }

    fn search_events<'a>(
        &'a self,
        calendar_id: &'a str,
        query: &'a SearchQuery,
    ) -> BoxFuture<'a, TransportResult<Vec<RawEvent>>> {
        Box::pin(async move {
            self.record(Call::Search(calendar_id.to_string()));
            let needle = format!("SUMMARY:{}", query.query);
            let mut events: Vec<RawEvent> = self
                .resources
                .lock()
                .unwrap()
                .values()
                .filter(|raw| raw.data.contains(&needle))
                .cloned()
                .collect();
            events.sort_by(|a, b| a.path.cmp(&b.path));
            Ok(events.into_iter().skip(query.offset).take(query.limit).collect())
        })
    }

    fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, TransportResult<RawEvent>> {
        Box::pin(async move {
            self.record(Call::Get(path.to_string()));
            self.resources
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| TransportError::not_found(format!("{} not found", path)))
        })
    }

    fn create<'a>(
        &'a self,
        path: &'a str,
        payload: String,
        options: CreateOptions,
    ) -> BoxFuture<'a, TransportResult<WriteOutcome>> {
        Box::pin(async move {
            self.record(Call::Create {
                path: path.to_string(),
                payload,
                grace_period: options.grace_period,
            });
            self.next_write()
        })
    }

    fn modify<'a>(
        &'a self,
        path: &'a str,
        payload: String,
        etag: Option<&'a VersionTag>,
    ) -> BoxFuture<'a, TransportResult<WriteOutcome>> {
        Box::pin(async move {
            self.record(Call::Modify {
                path: path.to_string(),
                payload,
                etag: etag.cloned(),
            });
            self.next_write()
        })
    }

    fn remove<'a>(
        &'a self,
        path: &'a str,
        etag: Option<&'a VersionTag>,
    ) -> BoxFuture<'a, TransportResult<WriteOutcome>> {
        Box::pin(async move {
            self.record(Call::Remove {
                path: path.to_string(),
                etag: etag.cloned(),
            });
            self.next_write()
        })
    }

    fn change_participation<'a>(
        &'a self,
        path: &'a str,
        payload: String,
        etag: Option<&'a VersionTag>,
    ) -> BoxFuture<'a, TransportResult<ParticipationResponse>> {
        Box::pin(async move {
            self.record(Call::Participation {
                path: path.to_string(),
                payload,
                etag: etag.cloned(),
            });
            self.participations
                .lock()
                .unwrap()
                .pop_front()
                .map(Scripted::into_result)
                .unwrap_or_else(|| Ok(ParticipationResponse::no_content()))
        })
    }
}

/// Grace period API recording cancelled tasks.
#[derive(Debug, Default)]
pub struct FakeGraceApi {
    cancelled: Mutex<Vec<TaskId>>,
    failure: Option<(TransportErrorCode, String)>,
    latency: Duration,
}

impl FakeGraceApi {
    /// Fails every cancel request with `error`.
    pub fn failing(error: TransportError) -> Self {
        Self {
            failure: Some((error.code(), error.message().to_string())),
            ..Default::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn cancelled(&self) -> Vec<TaskId> {
        self.cancelled.lock().unwrap().clone()
    }
}

impl GracePeriodApi for FakeGraceApi {
    fn cancel_task<'a>(&'a self, task_id: &'a TaskId) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(async move {
            self.cancelled.lock().unwrap().push(task_id.clone());
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            match self.failure {
                Some((code, ref message)) => Err(TransportError::new(code, message.clone())),
                None => Ok(()),
            }
        })
    }
}

/// Notifier keeping every message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    infos: Mutex<Vec<String>>,
    errors: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<(String, String)> {
        self.errors.lock().unwrap().clone()
    }
}

impl UserNotifier for RecordingNotifier {
    fn info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }

    fn weak_error(&self, title: &str, message: &str) {
        self.errors
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }
}

/// Emitter keeping every signal.
#[derive(Debug, Default)]
pub struct RecordingEmitter {
    signals: Mutex<Vec<UiSignal>>,
}

impl RecordingEmitter {
    pub fn signals(&self) -> Vec<UiSignal> {
        self.signals.lock().unwrap().clone()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit_created(&self, event: &CalendarEvent) {
        self.signals
            .lock()
            .unwrap()
            .push(UiSignal::Created(event.clone()));
    }

    fn emit_modified(&self, event: &CalendarEvent) {
        self.signals
            .lock()
            .unwrap()
            .push(UiSignal::Modified(event.clone()));
    }

    fn emit_removed(&self, id: &str) {
        self.signals
            .lock()
            .unwrap()
            .push(UiSignal::Removed(id.to_string()));
    }
}

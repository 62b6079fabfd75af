//! The calendar event engine.
//!
//! Every write follows the same workflow:
//!
//! ```text
//! Validating -> Dispatching -> AwaitingCommit(task) -> Committed | RolledBack
//!                    |                                      ^
//!                    +-- version conflict: refetch, retry --+
//! ```
//!
//! Instance edits are redirected to the master of their series before
//! anything reaches the transport. A write the server answers immediately is
//! committed on the spot. A deferred write is applied optimistically (ledger
//! and rendering signals) and then waits out its grace period, during which
//! the user may cancel it and get the previous state back.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use calsync_core::{Attendee, CalendarEvent, PartStat, TaskId, TimeWindow, VersionTag};
use calsync_transport::{
    CalendarTransport, CreateOptions, GracePeriodApi, RawEvent, SearchQuery, TransportError,
    WriteOutcome, generate_ics, parse_ics_content, parse_master,
};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::emitter::{BroadcastEmitter, EventEmitter};
use crate::error::{EngineError, EngineResult, Operation};
use crate::grace::{CancelOutcome, GraceManager, GraceMessages, GraceOutcome, GraceTask};
use crate::ledger::{DeltaKind, SharedLedger, shared_ledger};
use crate::master_cache::MasterEventCache;
use crate::notify::{TracingNotifier, UserNotifier};
use crate::significance::{ChangeComparator, DefaultComparator};

/// How a write workflow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// The write is final on the server.
    Committed,
    /// The user cancelled the write within its grace period.
    RolledBack,
    /// Nothing to do.
    Noop,
}

/// Options for [`CalendarEngine::modify_event`].
#[derive(Debug, Clone, Default)]
pub struct ModifyOptions {
    /// Overrides for the grace period messages.
    pub grace_messages: Option<GraceMessages>,
}

/// How a master write is rebuilt on the server copy after a version conflict.
#[derive(Clone, Copy)]
enum Rebase<'a> {
    /// The client's master is sent again under the fresh version tag.
    Whole,
    /// The instance override is applied to the fresh master.
    Occurrence(&'a CalendarEvent),
    /// The instance is excluded from the fresh master.
    Exclusion(&'a CalendarEvent),
}

impl Rebase<'_> {
    fn rebuild(self, fresh: &CalendarEvent) -> EngineResult<Option<CalendarEvent>> {
        match self {
            Self::Whole => Ok(None),
            Self::Occurrence(instance) => Ok(Some(fresh.with_occurrence_applied(instance)?)),
            Self::Exclusion(instance) => {
                let mut master = fresh.clone();
                master.delete_instance(instance)?;
                Ok(Some(master))
            }
        }
    }
}

/// Callback run once when a modification is rolled back, before the previous
/// state is emitted again.
pub struct RollbackHandler(Box<dyn FnOnce() + Send>);

impl RollbackHandler {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for RollbackHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RollbackHandler")
    }
}

struct Inner {
    transport: Arc<dyn CalendarTransport>,
    grace: GraceManager,
    ledger: SharedLedger,
    masters: MasterEventCache,
    emitter: Arc<dyn EventEmitter>,
    notifier: Arc<dyn UserNotifier>,
    comparator: Arc<dyn ChangeComparator>,
    config: EngineConfig,
    /// Pending grace task per event uid.
    pending: Mutex<HashMap<String, TaskId>>,
}

/// Builder for [`CalendarEngine`].
pub struct CalendarEngineBuilder {
    transport: Arc<dyn CalendarTransport>,
    grace_api: Arc<dyn GracePeriodApi>,
    emitter: Arc<dyn EventEmitter>,
    notifier: Arc<dyn UserNotifier>,
    comparator: Arc<dyn ChangeComparator>,
    ledger: SharedLedger,
    config: EngineConfig,
}

impl CalendarEngineBuilder {
    pub fn emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn UserNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn comparator(mut self, comparator: Arc<dyn ChangeComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Shares an existing ledger with the engine.
    pub fn ledger(mut self, ledger: SharedLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> EngineResult<CalendarEngine> {
        self.config.validate()?;
        let grace = GraceManager::new(
            self.grace_api,
            self.notifier.clone(),
            self.config.settled_task_memory,
        );

        Ok(CalendarEngine {
            inner: Arc::new(Inner {
                transport: self.transport,
                grace,
                ledger: self.ledger,
                masters: MasterEventCache::new(self.config.master_cache_ttl),
                emitter: self.emitter,
                notifier: self.notifier,
                comparator: self.comparator,
                config: self.config,
                pending: Mutex::new(HashMap::new()),
            }),
        })
    }
}

/// Optimistic calendar event engine.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CalendarEngine {
    inner: Arc<Inner>,
}

/// Event being written by a workflow.
///
/// Clears the event's pending task id, and the uid's slot in the pending map,
/// however the workflow exits.
struct InFlight<'a> {
    pending: &'a Mutex<HashMap<String, TaskId>>,
    event: &'a mut CalendarEvent,
    task: Option<TaskId>,
}

impl InFlight<'_> {
    fn stamp(&mut self, task_id: TaskId) {
        lock(self.pending).insert(self.event.uid.clone(), task_id.clone());
        self.event.grace_period_task_id = Some(task_id.clone());
        self.task = Some(task_id);
    }
}

impl Deref for InFlight<'_> {
    type Target = CalendarEvent;

    fn deref(&self) -> &CalendarEvent {
        self.event
    }
}

impl DerefMut for InFlight<'_> {
    fn deref_mut(&mut self) -> &mut CalendarEvent {
        self.event
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.event.grace_period_task_id = None;
        if let Some(task) = self.task.take() {
            let mut pending = lock(self.pending);
            if pending.get(&self.event.uid) == Some(&task) {
                pending.remove(&self.event.uid);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CalendarEngine {
    /// Starts building an engine over a transport and its grace period API.
    pub fn builder(
        transport: Arc<dyn CalendarTransport>,
        grace_api: Arc<dyn GracePeriodApi>,
    ) -> CalendarEngineBuilder {
        CalendarEngineBuilder {
            transport,
            grace_api,
            emitter: Arc::new(BroadcastEmitter::default()),
            notifier: Arc::new(TracingNotifier),
            comparator: Arc::new(DefaultComparator),
            ledger: shared_ledger(),
            config: EngineConfig::default(),
        }
    }

    /// The registration ledger, for rendering code.
    pub fn ledger(&self) -> SharedLedger {
        self.inner.ledger.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn master_cache(&self) -> &MasterEventCache {
        &self.inner.masters
    }

    /// The pending grace task of an event, if any.
    pub fn pending_task(&self, uid: &str) -> Option<TaskId> {
        lock(&self.inner.pending).get(uid).cloned()
    }

    fn in_flight<'a>(&'a self, event: &'a mut CalendarEvent) -> InFlight<'a> {
        InFlight {
            pending: &self.inner.pending,
            event,
            task: None,
        }
    }

    // Reads

    /// Lists every event of a calendar inside a window.
    ///
    /// Each VEVENT of each resource is returned on its own, carrying the
    /// resource path and version tag.
    pub async fn list_events(
        &self,
        calendar_path: &str,
        window: &TimeWindow,
        timezone: Option<&str>,
    ) -> EngineResult<Vec<CalendarEvent>> {
        let resources = self
            .inner
            .transport
            .list_events(calendar_path, window, timezone)
            .await
            .map_err(|e| EngineError::transport(Operation::List, calendar_path, e))?;
        decode_all(&resources).map_err(|e| EngineError::transport(Operation::List, calendar_path, e))
    }

    /// Searches the events of a calendar.
    pub async fn search_events(
        &self,
        calendar_id: &str,
        query: &SearchQuery,
    ) -> EngineResult<Vec<CalendarEvent>> {
        let resources = self
            .inner
            .transport
            .search_events(calendar_id, query)
            .await
            .map_err(|e| EngineError::transport(Operation::Search, &query.query, e))?;
        decode_all(&resources).map_err(|e| EngineError::transport(Operation::Search, &query.query, e))
    }

    /// Fetches an event with its overridden instances and version tag.
    pub async fn get_event(&self, path: &str) -> EngineResult<CalendarEvent> {
        self.fetch(path)
            .await
            .map_err(|e| EngineError::transport(Operation::Fetch, path, e))
    }

    async fn fetch(&self, path: &str) -> Result<CalendarEvent, TransportError> {
        let raw = self.inner.transport.get(path).await?;
        parse_master(&raw)
    }

    /// Returns the attendees of `event` whose address is one of `emails`.
    ///
    /// The organizer is included when listed too.
    pub fn get_invited_attendees(&self, event: &CalendarEvent, emails: &[String]) -> Vec<Attendee> {
        let listed = |attendee: &Attendee| emails.iter().any(|e| attendee.has_address(e));

        let mut invited: Vec<Attendee> = event.attendees.iter().filter(|a| listed(a)).cloned().collect();
        if let Some(ref organizer) = event.organizer {
            if listed(organizer) {
                invited.push(organizer.clone());
            }
        }
        invited
    }

    /// Returns the master of an instance's series with the instance applied.
    ///
    /// The master comes from the master cache, or from the server. Neither the
    /// instance nor the cached master is modified. Masters and non-recurring
    /// events are returned as they are.
    pub async fn get_modified_master(&self, instance: &CalendarEvent) -> EngineResult<CalendarEvent> {
        if !instance.is_instance() {
            return Ok(instance.clone());
        }
        let path = instance.path.as_deref().ok_or_else(|| {
            EngineError::transport(
                Operation::Fetch,
                &instance.title,
                TransportError::not_found(format!("instance {} has no resource path", instance.id())),
            )
        })?;

        let master = match self.inner.masters.get(path).await {
            Some(master) => master,
            None => {
                debug!(path = %path, uid = %instance.uid, "Master not cached, fetching");
                self.get_event(path).await?
            }
        };
        Ok(master.with_occurrence_applied(instance)?)
    }

    // Cancellation

    /// Cancels the pending grace task of an event.
    pub async fn cancel_pending(&self, uid: &str) -> CancelOutcome {
        match self.pending_task(uid) {
            Some(task_id) => self.cancel_task(&task_id).await,
            None => CancelOutcome::Unknown,
        }
    }

    /// Cancels a grace task by id.
    pub async fn cancel_task(&self, task_id: &TaskId) -> CancelOutcome {
        self.inner.grace.cancel(task_id).await
    }

    /// Cancels whatever is pending for an event before a new workflow starts.
    ///
    /// Returns true if a pending write was cancelled in time.
    async fn cancel_existing(&self, event: &CalendarEvent) -> EngineResult<bool> {
        let mut tasks: Vec<TaskId> = self.pending_task(&event.uid).into_iter().collect();
        if let Some(ref own) = event.grace_period_task_id {
            if !tasks.contains(own) {
                tasks.push(own.clone());
            }
        }

        let mut cancelled = false;
        for task_id in tasks {
            debug!(uid = %event.uid, task_id = %task_id, "Cancelling pending task before new workflow");
            match self.inner.grace.cancel(&task_id).await {
                CancelOutcome::Cancelled => cancelled = true,
                CancelOutcome::Failed(reason) => {
                    return Err(EngineError::CancellationFailed { task_id, reason });
                }
                CancelOutcome::TooLate | CancelOutcome::Unknown => {}
            }
        }
        Ok(cancelled)
    }

    /// Returns true if the event's creation is still waiting out its grace period.
    async fn creation_pending(&self, uid: &str) -> bool {
        self.inner
            .ledger
            .read()
            .await
            .get(uid)
            .is_some_and(|r| r.kind == DeltaKind::Add && r.pending)
    }

    // Failures

    fn transport_failure(&self, operation: Operation, event: &CalendarEvent, err: TransportError) -> EngineError {
        error!(uid = %event.uid, operation = %operation, error = %err, "Calendar write failed");
        self.inner.notifier.weak_error(
            operation.failure_title(),
            &format!("{}. Please refresh your calendar", err.message()),
        );
        EngineError::transport(operation, &event.title, err)
    }

    fn conflicts_exhausted(&self, operation: Operation, event: &CalendarEvent, attempts: u32) -> EngineError {
        warn!(uid = %event.uid, operation = %operation, attempts = attempts, "Version conflict persisted");
        self.inner.notifier.weak_error(
            operation.failure_title(),
            "The event was changed elsewhere. Please refresh your calendar",
        );
        EngineError::ConflictRetriesExhausted {
            operation,
            title: event.title.clone(),
            attempts,
        }
    }

    /// Refetches the server copy after the `attempt`-th write hit a version
    /// conflict. Gives up once the configured retries are spent.
    async fn refetch(&self, operation: Operation, path: &str, event: &CalendarEvent, attempt: u32) -> EngineResult<CalendarEvent> {
        if attempt > self.inner.config.max_conflict_retries {
            return Err(self.conflicts_exhausted(operation, event, attempt));
        }
        debug!(uid = %event.uid, path = %path, attempt = attempt, "Version conflict, refetching");
        self.fetch(path)
            .await
            .map_err(|e| self.transport_failure(operation, event, e))
    }

    // Ledger

    /// Returns true if the ledger entry of `uid` was registered by `task_id`.
    async fn owns_registration(&self, uid: &str, task_id: &TaskId) -> bool {
        self.inner
            .ledger
            .read()
            .await
            .get(uid)
            .is_some_and(|r| r.event.grace_period_task_id.as_ref() == Some(task_id))
    }

    async fn commit_registration(&self, uid: &str, task_id: &TaskId) {
        if self.owns_registration(uid, task_id).await {
            self.inner.ledger.write().await.mark_committed(uid);
        }
    }

    // Writes

    /// Creates an event in a calendar.
    ///
    /// The event path is derived from the calendar path and the uid. With
    /// `options.grace_period`, the creation can be cancelled until the grace
    /// delay elapses; a cancelled creation is removed from the ledger and the
    /// rendering layer.
    pub async fn create_event(
        &self,
        calendar_id: &str,
        calendar_path: &str,
        event: &mut CalendarEvent,
        options: CreateOptions,
    ) -> EngineResult<WorkflowOutcome> {
        let mut event = self.in_flight(event);
        let path = format!("{}/{}.ics", calendar_path.trim_end_matches('/'), event.uid);
        event.path = Some(path.clone());
        self.cancel_existing(&event).await?;

        debug!(uid = %event.uid, calendar = %calendar_id, path = %path, "Creating event");
        let outcome = self
            .inner
            .transport
            .create(&path, generate_ics(&event), options)
            .await
            .map_err(|e| self.transport_failure(Operation::Create, &event, e))?;

        let task_id = match outcome {
            WriteOutcome::Immediate(stored) => {
                if let Some(etag) = stored.and_then(|raw| raw.etag) {
                    event.etag = Some(etag);
                }
                self.inner.ledger.write().await.register_add(&event, false);
                self.inner.emitter.emit_created(&event);
                info!(uid = %event.uid, path = %path, "Event created");
                return Ok(WorkflowOutcome::Committed);
            }
            WriteOutcome::Deferred(task_id) => task_id,
        };

        event.stamp(task_id.clone());
        if event.is_recurring() {
            self.inner.masters.save(&event).await;
        }
        self.inner.ledger.write().await.register_add(&event, true);
        self.inner.emitter.emit_created(&event);

        let task = GraceTask::new(task_id.clone(), self.inner.config.grace_delay, event.uid.clone())
            .performed_action(format!("You are about to create a new event ({}).", event.title))
            .cancel_failed("An error has occurred, the creation could not be reverted")
            .cancel_too_late("It is too late to cancel the creation")
            .grace_period_fail("Event creation failed. Please refresh your calendar")
            .success_text(format!("Calendar - {} has been created.", event.title));

        match self.inner.grace.grace(task).await {
            GraceOutcome::Committed => {
                match self.fetch(&path).await {
                    Ok(stored) => event.etag = stored.etag,
                    Err(e) => warn!(uid = %event.uid, path = %path, error = %e, "Could not read version tag of created event"),
                }
                self.commit_registration(&event.uid, &task_id).await;
                Ok(WorkflowOutcome::Committed)
            }
            GraceOutcome::Cancelled => {
                if self.owns_registration(&event.uid, &task_id).await {
                    self.inner.ledger.write().await.delete_registration(&event.uid);
                }
                self.inner.emitter.emit_removed(&event.id());
                if event.is_recurring() {
                    self.inner.masters.remove(&path).await;
                }
                Ok(WorkflowOutcome::RolledBack)
            }
            GraceOutcome::Failed(reason) => Err(EngineError::CancellationFailed { task_id, reason }),
        }
    }

    /// Modifies an event.
    ///
    /// `old_event` is the state shown before the edit: it decides whether the
    /// change is significant and is restored if the user cancels. For an
    /// instance, the whole master is written with the instance applied.
    pub async fn modify_event(
        &self,
        path: &str,
        event: &mut CalendarEvent,
        old_event: &CalendarEvent,
        etag: Option<&VersionTag>,
        rollback: Option<RollbackHandler>,
        options: ModifyOptions,
    ) -> EngineResult<WorkflowOutcome> {
        if *event == *old_event {
            debug!(uid = %event.uid, "Event unchanged");
            event.grace_period_task_id = None;
            return Ok(WorkflowOutcome::Noop);
        }
        if !event.is_instance() {
            return self
                .modify_master(path, event, old_event, etag, rollback, options, Rebase::Whole)
                .await;
        }

        let instance = self.in_flight(event);
        let mut new_master = self.get_modified_master(&instance).await?;
        let mut old_master = new_master.clone();
        old_master.modify_occurrence(old_event, true)?;
        drop(instance);

        self.modify_master(
            path,
            &mut new_master,
            &old_master,
            etag,
            rollback,
            options,
            Rebase::Occurrence(event),
        )
        .await
    }

    async fn modify_master(
        &self,
        path: &str,
        event: &mut CalendarEvent,
        old_event: &CalendarEvent,
        etag: Option<&VersionTag>,
        rollback: Option<RollbackHandler>,
        options: ModifyOptions,
        rebase: Rebase<'_>,
    ) -> EngineResult<WorkflowOutcome> {
        let mut event = self.in_flight(event);

        let significant = self.inner.comparator.is_significant(&event, old_event);
        if significant {
            event.change_participation(PartStat::NeedsAction, None);
            event.sequence += 1;
            debug!(uid = %event.uid, sequence = event.sequence, "Significant change");
        }
        self.cancel_existing(&event).await?;

        let mut etag = etag.cloned();
        let mut previous = old_event.clone();
        let mut attempt = 1;
        let outcome = loop {
            let result = self
                .inner
                .transport
                .modify(path, generate_ics(&event), etag.as_ref())
                .await;
            match result {
                Ok(outcome) => break outcome,
                Err(e) if e.is_version_conflict() => {
                    let fresh = self.refetch(Operation::Modify, path, &event, attempt).await?;
                    if let Some(mut rebuilt) = rebase.rebuild(&fresh)? {
                        if significant {
                            rebuilt.change_participation(PartStat::NeedsAction, None);
                        }
                        rebuilt.sequence = fresh.sequence;
                        *event = rebuilt;
                    }
                    event.etag = fresh.etag.clone();
                    let floor = if significant { fresh.sequence + 1 } else { fresh.sequence };
                    event.sequence = event.sequence.max(floor);
                    etag = fresh.etag.clone();
                    previous = fresh;
                    attempt += 1;
                }
                Err(e) => return Err(self.transport_failure(Operation::Modify, &event, e)),
            }
        };

        let task_id = match outcome {
            WriteOutcome::Immediate(stored) => {
                if let Some(new_etag) = stored.and_then(|raw| raw.etag) {
                    event.etag = Some(new_etag);
                }
                self.inner.ledger.write().await.register_update(&event, false);
                if event.is_recurring() {
                    self.inner.masters.save(&event).await;
                }
                self.inner.emitter.emit_modified(&event);
                info!(uid = %event.uid, path = %path, attempts = attempt, "Event modified");
                return Ok(WorkflowOutcome::Committed);
            }
            WriteOutcome::Deferred(task_id) => task_id,
        };

        event.stamp(task_id.clone());
        self.inner.ledger.write().await.register_update(&event, true);
        if event.is_recurring() {
            self.inner.masters.save(&event).await;
        }
        self.inner.emitter.emit_modified(&event);

        let mut task = GraceTask::new(task_id.clone(), self.inner.config.grace_delay, event.uid.clone())
            .performed_action(format!("You are about to modify an event ({}).", event.title))
            .cancel_failed("An error has occurred, the modification could not be reverted")
            .cancel_too_late("It is too late to cancel the modification")
            .cancel_success(format!("Calendar - Modification of {} has been canceled.", event.title))
            .grace_period_fail("Event modification failed, please refresh your calendar")
            .success_text(format!("Calendar - {} has been modified.", event.title));
        if let Some(ref messages) = options.grace_messages {
            task = task.with_messages(messages);
        }

        match self.inner.grace.grace(task).await {
            GraceOutcome::Committed => {
                self.commit_registration(&event.uid, &task_id).await;
                Ok(WorkflowOutcome::Committed)
            }
            GraceOutcome::Cancelled => {
                if let Some(handler) = rollback {
                    handler.run();
                }
                if self.owns_registration(&event.uid, &task_id).await {
                    self.inner.ledger.write().await.register_update(&previous, false);
                }
                if previous.is_recurring() {
                    self.inner.masters.save(&previous).await;
                }
                self.inner.emitter.emit_modified(&previous);
                Ok(WorkflowOutcome::RolledBack)
            }
            GraceOutcome::Failed(reason) => Err(EngineError::CancellationFailed { task_id, reason }),
        }
    }

    /// Removes an event.
    ///
    /// An event whose creation is still in its grace period is dropped
    /// locally once that creation is cancelled. If the creation already
    /// committed, a delete is sent instead (without version tag when none is
    /// known). Removing an instance
    /// excludes it from its series, unless `remove_all_instances` is set or the
    /// series would be left with fewer than two occurrences, in which case
    /// the whole series is removed.
    pub async fn remove_event(
        &self,
        path: &str,
        event: &mut CalendarEvent,
        etag: Option<&VersionTag>,
        remove_all_instances: bool,
    ) -> EngineResult<WorkflowOutcome> {
        let mut event = self.in_flight(event);

        let unsaved = etag.is_none() && !event.is_instance() && self.creation_pending(&event.uid).await;
        let cancelled = self.cancel_existing(&event).await?;
        if unsaved && cancelled {
            // the cancelled creation already told the rendering layer
            debug!(uid = %event.uid, "Removed event before its creation committed");
            self.inner.ledger.write().await.delete_registration(&event.uid);
            return Ok(WorkflowOutcome::Committed);
        }

        let removed_id = if event.is_instance() {
            let old_master = self.get_modified_master(&event).await?;
            let mut new_master = old_master.clone();
            new_master.delete_instance(&event)?;

            let whole_series = remove_all_instances || new_master.expand(None, None, 2)?.len() < 2;
            if !whole_series {
                let instance = event.clone();
                drop(event);
                return self
                    .modify_master(
                        path,
                        &mut new_master,
                        &old_master,
                        etag,
                        None,
                        ModifyOptions::default(),
                        Rebase::Exclusion(&instance),
                    )
                    .await;
            }
            debug!(uid = %event.uid, "Removing whole series");
            event.uid.clone()
        } else {
            event.id()
        };

        self.perform_remove(path, &mut event, etag, &removed_id).await
    }

    async fn perform_remove(
        &self,
        path: &str,
        event: &mut InFlight<'_>,
        etag: Option<&VersionTag>,
        removed_id: &str,
    ) -> EngineResult<WorkflowOutcome> {
        let mut etag = etag.cloned();
        let mut attempt = 1;
        let outcome = loop {
            match self.inner.transport.remove(path, etag.as_ref()).await {
                Ok(outcome) => break outcome,
                Err(e) if e.is_version_conflict() => {
                    let fresh = self.refetch(Operation::Remove, path, event, attempt).await?;
                    etag = fresh.etag;
                    attempt += 1;
                }
                Err(e) => return Err(self.transport_failure(Operation::Remove, event, e)),
            }
        };

        let task_id = match outcome {
            WriteOutcome::Immediate(_) => {
                self.inner.ledger.write().await.register_delete(event, false);
                self.inner.masters.remove(path).await;
                self.inner.emitter.emit_removed(removed_id);
                info!(uid = %event.uid, path = %path, "Event removed");
                return Ok(WorkflowOutcome::Committed);
            }
            WriteOutcome::Deferred(task_id) => task_id,
        };

        event.stamp(task_id.clone());
        self.inner.ledger.write().await.register_delete(event, true);
        self.inner.emitter.emit_removed(removed_id);

        let task = GraceTask::new(task_id.clone(), self.inner.config.grace_delay, event.uid.clone())
            .performed_action(format!("You are about to delete the event ({}).", event.title))
            .cancel_failed("An error has occurred, the deletion could not be reverted")
            .cancel_success(format!("Calendar - Suppression of {} has been cancelled", event.title))
            .cancel_too_late("It is too late to cancel the deletion")
            .success_text(format!("Calendar - {} has been deleted.", event.title))
            .grace_period_fail("Event deletion failed. Please refresh your calendar");

        match self.inner.grace.grace(task).await {
            GraceOutcome::Committed => {
                self.commit_registration(&event.uid, &task_id).await;
                self.inner.masters.remove(path).await;
                Ok(WorkflowOutcome::Committed)
            }
            GraceOutcome::Cancelled => {
                if self.owns_registration(&event.uid, &task_id).await {
                    self.inner.ledger.write().await.delete_registration(&event.uid);
                }
                event.grace_period_task_id = None;
                self.inner.emitter.emit_created(event);
                Ok(WorkflowOutcome::RolledBack)
            }
            GraceOutcome::Failed(reason) => Err(EngineError::CancellationFailed { task_id, reason }),
        }
    }

    /// Sets the participation status of the attendees listed in `emails`.
    ///
    /// Returns `None` when the event has no attendees or nothing changes;
    /// no request is sent then. Otherwise returns the event as stored by the
    /// server. A version conflict refetches the event and retries against
    /// the fresh version tag.
    pub async fn change_participation(
        &self,
        path: &str,
        event: &mut CalendarEvent,
        emails: &[String],
        status: PartStat,
        etag: Option<&VersionTag>,
        emit_events: bool,
    ) -> EngineResult<Option<CalendarEvent>> {
        let mut event = self.in_flight(event);
        if event.attendees.is_empty() || !event.change_participation(status, Some(emails)) {
            debug!(uid = %event.uid, status = status.as_ics_str(), "Participation unchanged");
            return Ok(None);
        }
        self.cancel_existing(&event).await?;

        let mut target = self.get_modified_master(&event).await?;
        let mut etag = etag.cloned();
        let mut attempt = 1;
        loop {
            let result = self
                .inner
                .transport
                .change_participation(path, generate_ics(&target), etag.as_ref())
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) if e.is_version_conflict() => {
                    let fresh = self
                        .refetch(Operation::ChangeParticipation, path, &event, attempt)
                        .await?;
                    etag = fresh.etag.clone();
                    attempt += 1;
                    match reapply_participation(fresh, &event, status, emails)? {
                        Some(rebased) => target = rebased,
                        None => {
                            debug!(uid = %event.uid, "Participation already stored");
                            return Ok(None);
                        }
                    }
                    continue;
                }
                Err(e) => return Err(self.transport_failure(Operation::ChangeParticipation, &event, e)),
            };

            if let (200, Some(data)) = (response.status, response.data) {
                let mut raw = RawEvent::new(path, data);
                raw.etag = response.etag;
                let stored = parse_master(&raw)
                    .map_err(|e| self.transport_failure(Operation::ChangeParticipation, &event, e))?;
                return Ok(Some(stored));
            }

            let stored = self
                .fetch(path)
                .await
                .map_err(|e| self.transport_failure(Operation::ChangeParticipation, &event, e))?;
            if emit_events {
                self.inner.emitter.emit_modified(&stored);
            }
            return Ok(Some(stored));
        }
    }
}

/// Applies a participation change to a freshly fetched master.
///
/// For an instance, the change lands on that occurrence of the master.
/// Returns `None` when the server copy already has the status.
fn reapply_participation(
    mut fresh: CalendarEvent,
    event: &CalendarEvent,
    status: PartStat,
    emails: &[String],
) -> EngineResult<Option<CalendarEvent>> {
    let Some(rid) = event.recurrence_id else {
        return Ok(fresh.change_participation(status, Some(emails)).then_some(fresh));
    };

    let mut occurrence = fresh.occurrence(rid)?;
    if !occurrence.change_participation(status, Some(emails)) {
        return Ok(None);
    }
    fresh.modify_occurrence(&occurrence, false)?;
    Ok(Some(fresh))
}

fn decode_all(resources: &[RawEvent]) -> Result<Vec<CalendarEvent>, TransportError> {
    let mut events = Vec::new();
    for raw in resources {
        events.extend(parse_ics_content(raw)?);
    }
    Ok(events)
}

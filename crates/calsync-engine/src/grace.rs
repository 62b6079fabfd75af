//! Grace period task manager.
//!
//! A deferred write stays cancellable for a delay after the server accepted
//! it. [`GraceManager::grace`] waits out that delay for one task while
//! [`GraceManager::cancel`] asks the server to drop the task. Both settle the
//! task exactly once:
//!
//! - delay elapsed without cancel: `Committed`
//! - cancel accepted by the server: `Cancelled`
//! - cancel arrived after the task ran: `TooLate`, the write stands
//! - cancel request failed: `Failed`, the server state is unknown
//!
//! Once a cancel request is in flight, the end of the delay waits for its
//! verdict.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use calsync_core::TaskId;
use calsync_transport::GracePeriodApi;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::notify::UserNotifier;

const NOTIFICATION_TITLE: &str = "Calendar";

/// Message overrides for a grace task. Unset fields keep the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraceMessages {
    pub performed_action: Option<String>,
    pub cancel_failed: Option<String>,
    pub cancel_too_late: Option<String>,
    pub grace_period_fail: Option<String>,
    pub success_text: Option<String>,
    pub cancel_success: Option<String>,
}

/// A deferred write waiting out its grace period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraceTask {
    pub id: TaskId,
    pub delay: Duration,
    /// Uid of the event the task writes.
    pub context: String,
    pub performed_action: String,
    pub cancel_failed: String,
    pub cancel_too_late: String,
    pub grace_period_fail: String,
    pub success_text: String,
    pub cancel_success: Option<String>,
}

impl GraceTask {
    pub fn new(id: TaskId, delay: Duration, context: impl Into<String>) -> Self {
        Self {
            id,
            delay,
            context: context.into(),
            performed_action: String::new(),
            cancel_failed: String::new(),
            cancel_too_late: String::new(),
            grace_period_fail: String::new(),
            success_text: String::new(),
            cancel_success: None,
        }
    }

    pub fn performed_action(mut self, message: impl Into<String>) -> Self {
        self.performed_action = message.into();
        self
    }

    pub fn cancel_failed(mut self, message: impl Into<String>) -> Self {
        self.cancel_failed = message.into();
        self
    }

    pub fn cancel_too_late(mut self, message: impl Into<String>) -> Self {
        self.cancel_too_late = message.into();
        self
    }

    pub fn grace_period_fail(mut self, message: impl Into<String>) -> Self {
        self.grace_period_fail = message.into();
        self
    }

    pub fn success_text(mut self, message: impl Into<String>) -> Self {
        self.success_text = message.into();
        self
    }

    pub fn cancel_success(mut self, message: impl Into<String>) -> Self {
        self.cancel_success = Some(message.into());
        self
    }

    /// Applies message overrides.
    pub fn with_messages(mut self, messages: &GraceMessages) -> Self {
        let overrides = [
            (&mut self.performed_action, &messages.performed_action),
            (&mut self.cancel_failed, &messages.cancel_failed),
            (&mut self.cancel_too_late, &messages.cancel_too_late),
            (&mut self.grace_period_fail, &messages.grace_period_fail),
            (&mut self.success_text, &messages.success_text),
        ];
        for (field, value) in overrides {
            if let Some(value) = value {
                *field = value.clone();
            }
        }
        if messages.cancel_success.is_some() {
            self.cancel_success = messages.cancel_success.clone();
        }
        self
    }
}

/// How a grace period ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraceOutcome {
    /// The write is final.
    Committed,
    /// The write was dropped by the server.
    Cancelled,
    /// Cancelling failed; the write may or may not have happened.
    Failed(String),
}

/// Answer to a cancel request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The task already ran.
    TooLate,
    /// The cancel request itself failed.
    Failed(String),
    /// No such task.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Cancelling,
}

struct Entry {
    phase: Phase,
    cancel_failed: String,
    cancel_too_late: String,
    verdict: watch::Sender<Option<CancelOutcome>>,
}

#[derive(Debug, Clone)]
enum Settled {
    Committed { too_late_message: String },
    Cancelled,
}

#[derive(Default)]
struct State {
    tasks: HashMap<TaskId, Entry>,
    settled: VecDeque<(TaskId, Settled)>,
}

/// Tracks the grace period of deferred writes.
pub struct GraceManager {
    api: Arc<dyn GracePeriodApi>,
    notifier: Arc<dyn UserNotifier>,
    state: Mutex<State>,
    settled_capacity: usize,
}

impl GraceManager {
    pub fn new(
        api: Arc<dyn GracePeriodApi>,
        notifier: Arc<dyn UserNotifier>,
        settled_capacity: usize,
    ) -> Self {
        Self {
            api,
            notifier,
            state: Mutex::new(State::default()),
            settled_capacity: settled_capacity.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remember(&self, state: &mut State, id: TaskId, settled: Settled) {
        state.settled.retain(|(known, _)| *known != id);
        while state.settled.len() >= self.settled_capacity {
            state.settled.pop_front();
        }
        state.settled.push_back((id, settled));
    }

    /// Waits out the grace period of a task.
    ///
    /// Shows `performed_action` right away and the terminal message once the
    /// task is settled.
    pub async fn grace(&self, task: GraceTask) -> GraceOutcome {
        let (verdict_tx, mut verdict_rx) = watch::channel(None);
        self.state().tasks.insert(
            task.id.clone(),
            Entry {
                phase: Phase::Pending,
                cancel_failed: task.cancel_failed.clone(),
                cancel_too_late: task.cancel_too_late.clone(),
                verdict: verdict_tx,
            },
        );
        let _guard = PendingGuard {
            manager: self,
            id: &task.id,
        };

        debug!(task_id = %task.id, uid = %task.context, delay_ms = task.delay.as_millis() as u64, "Grace period started");
        self.notifier.info(&task.performed_action);

        let verdict = tokio::select! {
            _ = tokio::time::sleep(task.delay) => self.expire(&task),
            verdict = wait_verdict(&mut verdict_rx) => Some(verdict),
        };
        let verdict = match verdict {
            Some(verdict) => verdict,
            None => {
                self.notifier.info(&task.success_text);
                info!(task_id = %task.id, uid = %task.context, "Grace period elapsed, write committed");
                return GraceOutcome::Committed;
            }
        };
        let verdict = match verdict {
            CancelOutcome::Unknown => wait_verdict(&mut verdict_rx).await,
            other => other,
        };

        match verdict {
            CancelOutcome::Cancelled => {
                if let Some(ref message) = task.cancel_success {
                    self.notifier.info(message);
                }
                info!(task_id = %task.id, uid = %task.context, "Write cancelled");
                GraceOutcome::Cancelled
            }
            CancelOutcome::TooLate | CancelOutcome::Unknown => GraceOutcome::Committed,
            CancelOutcome::Failed(reason) => {
                self.notifier
                    .weak_error(NOTIFICATION_TITLE, &task.grace_period_fail);
                warn!(task_id = %task.id, uid = %task.context, reason = %reason, "Grace period failed");
                GraceOutcome::Failed(reason)
            }
        }
    }

    /// Settles a task whose delay elapsed.
    ///
    /// Returns `None` when the task committed, or a placeholder verdict when a
    /// cancel request is in flight and its answer must be awaited.
    fn expire(&self, task: &GraceTask) -> Option<CancelOutcome> {
        let mut state = self.state();
        match state.tasks.get(&task.id).map(|entry| entry.phase) {
            Some(Phase::Cancelling) => Some(CancelOutcome::Unknown),
            _ => {
                state.tasks.remove(&task.id);
                self.remember(
                    &mut state,
                    task.id.clone(),
                    Settled::Committed {
                        too_late_message: task.cancel_too_late.clone(),
                    },
                );
                None
            }
        }
    }

    /// Requests cancellation of a task.
    ///
    /// Safe to call for unknown, settled or already cancelling tasks.
    pub async fn cancel(&self, id: &TaskId) -> CancelOutcome {
        let in_flight = {
            let mut state = self.state();
            let phase = state.tasks.get(id).map(|entry| entry.phase);
            match phase {
                Some(Phase::Pending) => {
                    if let Some(entry) = state.tasks.get_mut(id) {
                        entry.phase = Phase::Cancelling;
                    }
                    None
                }
                Some(Phase::Cancelling) => state.tasks.get(id).map(|e| e.verdict.subscribe()),
                None => {
                    let settled = state
                        .settled
                        .iter()
                        .find(|(known, _)| known == id)
                        .map(|(_, settled)| settled.clone());
                    drop(state);
                    return self.late_cancel(id, settled);
                }
            }
        };

        if let Some(mut verdict_rx) = in_flight {
            debug!(task_id = %id, "Cancellation already in flight");
            return wait_verdict(&mut verdict_rx).await;
        }

        debug!(task_id = %id, "Cancelling grace task");
        let outcome = match self.api.cancel_task(id).await {
            Ok(()) => CancelOutcome::Cancelled,
            Err(e) if e.is_not_found() => CancelOutcome::TooLate,
            Err(e) => CancelOutcome::Failed(e.to_string()),
        };

        let entry = {
            let mut state = self.state();
            let entry = state.tasks.remove(id);
            match outcome {
                CancelOutcome::Cancelled => {
                    self.remember(&mut state, id.clone(), Settled::Cancelled)
                }
                CancelOutcome::TooLate => self.remember(
                    &mut state,
                    id.clone(),
                    Settled::Committed {
                        too_late_message: entry
                            .as_ref()
                            .map(|e| e.cancel_too_late.clone())
                            .unwrap_or_default(),
                    },
                ),
                _ => {}
            }
            entry
        };

        if let Some(ref entry) = entry {
            match outcome {
                CancelOutcome::TooLate => self.notifier.info(&entry.cancel_too_late),
                CancelOutcome::Failed(ref reason) => {
                    warn!(task_id = %id, reason = %reason, "Grace task cancellation failed");
                    self.notifier.weak_error(NOTIFICATION_TITLE, &entry.cancel_failed);
                }
                _ => {}
            }
            entry.verdict.send_replace(Some(outcome.clone()));
        }
        outcome
    }

    fn late_cancel(&self, id: &TaskId, settled: Option<Settled>) -> CancelOutcome {
        match settled {
            Some(Settled::Committed { too_late_message }) => {
                debug!(task_id = %id, "Cancel after commit");
                self.notifier.info(&too_late_message);
                CancelOutcome::TooLate
            }
            Some(Settled::Cancelled) => CancelOutcome::Cancelled,
            None => {
                debug!(task_id = %id, "Cancel for unknown task ignored");
                CancelOutcome::Unknown
            }
        }
    }

    /// Number of tasks still in their grace period.
    pub fn pending_count(&self) -> usize {
        self.state().tasks.len()
    }

    pub fn is_pending(&self, id: &TaskId) -> bool {
        self.state().tasks.contains_key(id)
    }
}

/// Forgets a task whose grace future was dropped before settling.
struct PendingGuard<'a> {
    manager: &'a GraceManager,
    id: &'a TaskId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.manager.state();
        if state
            .tasks
            .get(self.id)
            .is_some_and(|entry| entry.phase == Phase::Pending)
        {
            state.tasks.remove(self.id);
        }
    }
}

async fn wait_verdict(rx: &mut watch::Receiver<Option<CancelOutcome>>) -> CancelOutcome {
    loop {
        if let Some(verdict) = rx.borrow_and_update().clone() {
            return verdict;
        }
        if rx.changed().await.is_err() {
            return rx
                .borrow()
                .clone()
                .unwrap_or_else(|| CancelOutcome::Failed("grace task dropped".to_string()));
        }
    }
}

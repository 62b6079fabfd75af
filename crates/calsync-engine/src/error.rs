//! Engine error types.

use std::fmt;

use calsync_core::{RecurrenceError, TaskId};
use calsync_transport::TransportError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// The workflow an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Search,
    Fetch,
    Create,
    Modify,
    Remove,
    ChangeParticipation,
    Publish,
}

impl Operation {
    /// Title shown to the user when the operation fails.
    pub fn failure_title(&self) -> &'static str {
        match self {
            Self::List => "Event listing failed",
            Self::Search => "Event search failed",
            Self::Fetch => "Event fetch failed",
            Self::Create => "Event creation failed",
            Self::Modify => "Event modification failed",
            Self::Remove => "Event deletion failed",
            Self::ChangeParticipation => "Participation change failed",
            Self::Publish => "Event update broadcast failed",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::List => "list",
            Self::Search => "search",
            Self::Fetch => "fetch",
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Remove => "remove",
            Self::ChangeParticipation => "change participation",
            Self::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in the engine.
///
/// Version conflicts and no-op requests never surface here: the first are
/// retried, the second resolve to [`WorkflowOutcome::Noop`](crate::WorkflowOutcome).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The transport failed for a reason other than a version conflict.
    #[error("Failed to {operation} '{title}': {source}")]
    Transport {
        operation: Operation,
        title: String,
        #[source]
        source: TransportError,
    },

    /// The server kept rejecting our version tag.
    #[error("Failed to {operation} '{title}': version conflict persisted after {attempts} attempts")]
    ConflictRetriesExhausted {
        operation: Operation,
        title: String,
        attempts: u32,
    },

    /// Cancelling a deferred write failed; the server state is unknown.
    #[error("Cancellation of task {task_id} failed: {reason}")]
    CancellationFailed { task_id: TaskId, reason: String },

    /// Recurrence handling failed.
    #[error("Recurrence error: {0}")]
    Recurrence(#[from] RecurrenceError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Live update hub misuse.
    #[error("Live update hub error: {message}")]
    LiveHub { message: String },
}

impl EngineError {
    /// Creates a transport error for an operation on an event.
    pub fn transport(operation: Operation, title: impl Into<String>, source: TransportError) -> Self {
        Self::Transport {
            operation,
            title: title.into(),
            source,
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a live hub error.
    pub fn live_hub(message: impl Into<String>) -> Self {
        Self::LiveHub {
            message: message.into(),
        }
    }

    /// Returns the underlying transport error, if any.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

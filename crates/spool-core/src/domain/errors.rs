//! Error types and classification.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::TaskId;

/// Classification of an execution failure.
///
/// - Transient: network/availability trouble, retried up to max_attempts.
/// - Permanent: retrying cannot help, the task fails on the spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Permanent,
}

/// Failure reported by a processor for one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::permanent("cancelled")
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Transient
    }

    /// Classify an opaque collaborator error string.
    ///
    /// Availability problems are retryable, missing or malformed input is not.
    /// Anything unrecognised is treated as transient.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        const PERMANENT: [&str; 6] = [
            "not found",
            "404",
            "no such file",
            "invalid",
            "unsupported",
            "corrupt",
        ];
        if PERMANENT.iter().any(|needle| lower.contains(needle)) {
            Self::permanent(message)
        } else {
            Self::transient(message)
        }
    }
}

/// A task that can never run, detected before it enters a queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Why a task was not accepted by a queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("task {0} is already queued or running")]
    Duplicate(TaskId),

    #[error("task {task_id} rejected: {reason}")]
    Rejected {
        task_id: TaskId,
        reason: ValidationError,
    },

    #[error("queue is shutting down")]
    ShuttingDown,
}

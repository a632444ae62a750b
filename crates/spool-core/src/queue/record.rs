//! Task record: a task plus everything the queue knows about it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{QueueTask, TaskError, TaskId, TaskKind, TaskStatus};

/// Metadata + task for one entry in a queue.
///
/// Design:
/// - This is the single source of truth for task state.
/// - All status transitions happen through the methods below.
/// - `attempts` counts failed executions; it only moves up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord<T, O> {
    pub task: T,
    pub kind: TaskKind,
    pub status: TaskStatus,

    pub attempts: u32,
    pub max_attempts: u32,

    /// Combined priority key (type weight * 10 + priority ordinal).
    pub priority_key: u32,

    pub last_error: Option<TaskError>,
    pub result: Option<O>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl<T: QueueTask, O> TaskRecord<T, O> {
    pub fn new(task: T, max_attempts: u32, priority_key: u32, now: DateTime<Utc>) -> Self {
        Self {
            task,
            kind: T::KIND,
            status: TaskStatus::Queued,
            attempts: 0,
            max_attempts,
            priority_key,
            last_error: None,
            result: None,
            created_at: now,
            started_at: None,
            last_attempt_at: None,
            completed_at: None,
            failed_at: None,
            cancelled_at: None,
        }
    }

    pub fn id(&self) -> &TaskId {
        self.task.id()
    }
}

impl<T, O> TaskRecord<T, O> {
    /// Mark as handed to the processor.
    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Processing;
        self.started_at = Some(now);
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>, output: O) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        self.result = Some(output);
    }

    /// Count one failed attempt. Returns the new attempt count.
    pub fn record_failure(&mut self, now: DateTime<Utc>, error: TaskError) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt_at = Some(now);
        self.last_error = Some(error);
        self.attempts
    }

    /// Should the last recorded failure end this task?
    pub fn is_exhausted(&self) -> bool {
        let permanent = self
            .last_error
            .as_ref()
            .is_some_and(|e| !e.is_retryable());
        permanent || self.attempts >= self.max_attempts
    }

    pub fn mark_retrying(&mut self) {
        self.status = TaskStatus::Retrying;
    }

    /// Move from Retrying back to Queued.
    pub fn requeue(&mut self) {
        self.status = TaskStatus::Queued;
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.failed_at = Some(now);
    }

    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Cancelled;
        self.cancelled_at = Some(now);
    }

    /// When the record reached its terminal state, if it has.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            TaskStatus::Completed => self.completed_at,
            TaskStatus::Failed => self.failed_at,
            TaskStatus::Cancelled => self.cancelled_at,
            _ => None,
        }
    }

    pub fn last_error_message(&self) -> Option<String> {
        self.last_error.as_ref().map(|e| e.message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;
    use chrono::TimeZone;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Probe {
        id: TaskId,
    }

    impl QueueTask for Probe {
        const KIND: TaskKind = TaskKind::Download;

        fn id(&self) -> &TaskId {
            &self.id
        }

        fn priority(&self) -> Priority {
            Priority::Normal
        }
    }

    fn record(max_attempts: u32) -> TaskRecord<Probe, String> {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        TaskRecord::new(Probe { id: TaskId::new("p") }, max_attempts, 3, now)
    }

    #[test]
    fn new_record_is_queued_without_attempts() {
        let r = record(2);
        assert_eq!(r.status, TaskStatus::Queued);
        assert_eq!(r.attempts, 0);
        assert_eq!(r.kind, TaskKind::Download);
        assert_eq!(r.id().as_str(), "p");
        assert!(r.finished_at().is_none());
    }

    #[test]
    fn transient_failures_exhaust_at_max_attempts() {
        let mut r = record(2);
        let now = r.created_at;

        assert_eq!(r.record_failure(now, TaskError::transient("offline")), 1);
        assert!(!r.is_exhausted());

        assert_eq!(r.record_failure(now, TaskError::transient("offline")), 2);
        assert!(r.is_exhausted());
    }

    #[test]
    fn permanent_failure_exhausts_immediately() {
        let mut r = record(5);
        r.record_failure(r.created_at, TaskError::permanent("not found"));
        assert!(r.is_exhausted());
        assert_eq!(r.last_error_message().as_deref(), Some("not found"));
    }

    #[test]
    fn finished_at_follows_terminal_status() {
        let mut r = record(2);
        let now = r.created_at;
        r.mark_processing(now);
        assert!(r.finished_at().is_none());

        r.mark_completed(now, "done".to_string());
        assert_eq!(r.finished_at(), Some(now));
        assert_eq!(r.result.as_deref(), Some("done"));
    }
}

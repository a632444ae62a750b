//! Queue module: the generic priority task queue engine.
//!
//! A `TaskQueue<P>` holds pending work in priority order, runs it through the
//! processor `P` within a concurrency budget, retries recoverable failures and
//! keeps a time-bounded history of finished work.

mod history;
mod loops;
mod memory;
mod record;
mod retry;
mod state;

pub use memory::TaskQueue;
pub use record::TaskRecord;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::domain::{QueueTask, TaskError, ValidationError};

/// Record type of the queue driven by processor `P`.
pub type RecordOf<P> = TaskRecord<<P as TaskProcessor>::Task, <P as TaskProcessor>::Output>;

/// Kind-specific half of a queue: how to weigh a task and how to run it.
///
/// Design intent:
/// - The queue owns state transitions (Queued -> Processing -> ...).
/// - The processor performs the side effect and reports the result.
/// - Validation happens at enqueue time so doomed tasks never occupy a slot.
#[async_trait]
pub trait TaskProcessor: Send + Sync + 'static {
    type Task: QueueTask;
    type Output: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Validate `task` and return its type weight (the `typeClass` part of the
    /// combined priority key).
    fn type_weight(&self, task: &Self::Task) -> Result<u32, ValidationError>;

    /// Run one attempt.
    ///
    /// `cancel` fires when the task is cancelled while in flight. Checking it
    /// is cooperative; the queue ignores whatever this returns after a cancel.
    async fn process(
        &self,
        task: Self::Task,
        cancel: CancellationToken,
    ) -> Result<Self::Output, TaskError>;
}

/// Reaction to terminal transitions, run after the queue state is updated.
///
/// Hooks are where cross-queue chaining lives: the download queue's hook
/// enqueues the thumbnail task.
#[async_trait]
pub trait CompletionHook<P: TaskProcessor>: Send + Sync {
    async fn on_completed(&self, _record: &RecordOf<P>) {}

    async fn on_failed(&self, _record: &RecordOf<P>) {}

    async fn on_cancelled(&self, _record: &RecordOf<P>) {}
}

/// Introspection view of a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueContents<T, O> {
    /// In dispatch order.
    pub pending: Vec<TaskRecord<T, O>>,
    pub in_flight: Vec<TaskRecord<T, O>>,
    pub retrying: Vec<TaskRecord<T, O>>,
    /// Newest first, capped at the configured `recent_limit`.
    pub recent_completed: Vec<TaskRecord<T, O>>,
    pub recent_failed: Vec<TaskRecord<T, O>>,
}

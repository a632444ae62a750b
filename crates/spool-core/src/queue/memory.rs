//! In-memory queue implementation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::loops::run_every;
use super::state::{InFlight, Parked, QueueState};
use super::{CompletionHook, QueueContents, RecordOf, RetryPolicy, TaskProcessor, TaskRecord};
use crate::config::{ConfigError, QueueConfig};
use crate::domain::{
    DomainEvent, EnqueueError, QueueStatsSnapshot, QueueTask, TaskError, TaskId, TaskKind,
    TaskLifecycleEvent, combined_key,
};
use crate::ports::{Clock, EventSink};

type StateOf<P> = QueueState<<P as TaskProcessor>::Task, <P as TaskProcessor>::Output>;
type HookOf<P> = Arc<dyn CompletionHook<P>>;

pub(super) struct QueueInner<P: TaskProcessor> {
    config: QueueConfig,
    retry_policy: RetryPolicy,
    processor: Arc<P>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    hooks: RwLock<Vec<HookOf<P>>>,
    state: Mutex<StateOf<P>>,
    /// Signalled whenever a task leaves the live collections.
    idle: Notify,
    shutdown_tx: watch::Sender<bool>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl<P: TaskProcessor> QueueInner<P> {
    fn lock(&self) -> MutexGuard<'_, StateOf<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hooks(&self) -> Vec<HookOf<P>> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Oldest terminal timestamp still inside the retention window.
    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.config.retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Build a lifecycle event. Callers emit it before releasing the state
    /// lock so event order follows transition order.
    fn lifecycle(
        &self,
        state: &StateOf<P>,
        record: &RecordOf<P>,
        now: DateTime<Utc>,
    ) -> DomainEvent {
        DomainEvent::TaskLifecycle(TaskLifecycleEvent {
            task_id: record.id().clone(),
            kind: record.kind,
            status: record.status,
            attempts: record.attempts,
            last_error: record.last_error_message(),
            stats: state.snapshot(record.kind, self.cutoff(now)),
        })
    }

    /// A task finished running its hooks.
    fn settle(&self) {
        {
            let mut state = self.lock();
            state.settling = state.settling.saturating_sub(1);
        }
        self.idle.notify_waiters();
    }
}

/// A priority task queue driving one [`TaskProcessor`].
///
/// Cheap to clone; clones share the same queue.
///
/// Tasks move `queued -> processing -> completed | failed | retrying`, with
/// `retrying` tasks re-entering `queued` after the retry delay. Lifecycle
/// events go to the [`EventSink`] after the state lock is released, so sinks
/// always observe committed state.
pub struct TaskQueue<P: TaskProcessor> {
    inner: Arc<QueueInner<P>>,
}

impl<P: TaskProcessor> Clone for TaskQueue<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: TaskProcessor> TaskQueue<P> {
    pub fn new(
        processor: P,
        config: QueueConfig,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        config.validate(<P::Task as QueueTask>::KIND.as_str())?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(QueueInner {
                retry_policy: config.retry_policy(),
                config,
                processor: Arc::new(processor),
                clock,
                events,
                hooks: RwLock::new(Vec::new()),
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
                shutdown_tx,
                loops: Mutex::new(Vec::new()),
            }),
        })
    }

    pub(super) fn downgrade(&self) -> Weak<QueueInner<P>> {
        Arc::downgrade(&self.inner)
    }

    pub(super) fn upgrade(inner: &Weak<QueueInner<P>>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    pub fn kind(&self) -> TaskKind {
        <P::Task as QueueTask>::KIND
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Register a hook run after every terminal transition.
    pub fn add_hook(&self, hook: Arc<dyn CompletionHook<P>>) {
        self.inner
            .hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    /// Admit a task.
    ///
    /// Rejected when its id is already pending, executing or waiting for a
    /// retry, when the processor cannot handle it, or once shutdown began.
    pub fn try_enqueue(&self, task: P::Task) -> Result<(), EnqueueError> {
        let id = task.id().clone();
        let weight = self
            .inner
            .processor
            .type_weight(&task)
            .map_err(|reason| EnqueueError::Rejected {
                task_id: id.clone(),
                reason,
            })?;
        let key = combined_key(weight, task.priority());
        let now = self.inner.clock.now();

        let position = {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(EnqueueError::ShuttingDown);
            }
            if state.contains(id.as_str()) {
                return Err(EnqueueError::Duplicate(id));
            }
            let record = TaskRecord::new(task, self.inner.config.max_attempts, key, now);
            let position = state.insert_pending(record);
            self.inner
                .events
                .emit(self.inner.lifecycle(&state, &state.pending[position], now));
            position
        };

        debug!(task_id = %id, kind = %self.kind(), priority_key = key, position, "task queued");
        self.dispatch();
        Ok(())
    }

    /// Boolean form of [`TaskQueue::try_enqueue`].
    pub fn enqueue(&self, task: P::Task) -> bool {
        match self.try_enqueue(task) {
            Ok(()) => true,
            Err(err) => {
                debug!(kind = %self.kind(), error = %err, "enqueue rejected");
                false
            }
        }
    }

    /// Start pending tasks until the concurrency budget is used up.
    /// Returns how many were started.
    pub fn dispatch(&self) -> usize {
        let now = self.inner.clock.now();
        let mut started = Vec::new();

        {
            let mut state = self.inner.lock();
            if state.paused || state.closed {
                return 0;
            }
            while state.in_flight.len() < self.inner.config.concurrency {
                let Some(mut record) = state.pending.pop_front() else {
                    break;
                };
                record.mark_processing(now);
                let lease = state.next_lease();
                let cancel = CancellationToken::new();
                started.push((record.task.clone(), lease, cancel.clone()));
                state.in_flight.insert(
                    record.id().clone(),
                    InFlight {
                        record,
                        lease,
                        cancel,
                    },
                );
            }
            for (task, _, _) in &started {
                if let Some(flight) = state.in_flight.get(task.id().as_str()) {
                    self.inner
                        .events
                        .emit(self.inner.lifecycle(&state, &flight.record, now));
                }
            }
        }

        let count = started.len();
        for (task, lease, cancel) in started {
            debug!(task_id = %task.id(), kind = %self.kind(), lease, "dispatching task");
            tokio::spawn(self.clone().execute(task, lease, cancel));
        }
        count
    }

    async fn execute(self, task: P::Task, lease: u64, cancel: CancellationToken) {
        let id = task.id().clone();
        let processor = Arc::clone(&self.inner.processor);
        let token = cancel.clone();
        // Own task so a panicking processor surfaces as a JoinError.
        let mut handle = tokio::spawn(async move { processor.process(task, token).await });

        let joined = match self.inner.config.execution_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    cancel.cancel();
                    handle.abort();
                    warn!(task_id = %id, kind = %self.kind(), timeout = ?limit, "task execution timed out");
                    let error = TaskError::transient(format!(
                        "execution timed out after {}s",
                        limit.as_secs_f64()
                    ));
                    self.finish_failure(id, lease, error).await;
                    return;
                }
            },
            None => handle.await,
        };

        let result = joined.unwrap_or_else(|join_err| {
            Err(TaskError::transient(format!("processor aborted: {join_err}")))
        });
        match result {
            Ok(output) => self.finish_success(id, lease, output).await,
            Err(error) => self.finish_failure(id, lease, error).await,
        }
    }

    async fn finish_success(&self, id: TaskId, lease: u64, output: P::Output) {
        let now = self.inner.clock.now();
        let record = {
            let mut state = self.inner.lock();
            if !state.holds_lease(id.as_str(), lease) {
                debug!(task_id = %id, lease, "dropping result of a task no longer in flight");
                return;
            }
            let Some(flight) = state.in_flight.remove(id.as_str()) else {
                return;
            };
            let mut record = flight.record;
            record.mark_completed(now, output);
            state.total_completed += 1;
            state.completed.push(record.clone());
            state.settling += 1;
            self.inner
                .events
                .emit(self.inner.lifecycle(&state, &record, now));
            record
        };

        info!(task_id = %id, kind = %record.kind, attempts = record.attempts, "task completed");
        self.dispatch();
        for hook in self.inner.hooks() {
            hook.on_completed(&record).await;
        }
        self.inner.settle();
    }

    async fn finish_failure(&self, id: TaskId, lease: u64, error: TaskError) {
        let now = self.inner.clock.now();
        let (record, retry_in) = {
            let mut state = self.inner.lock();
            if !state.holds_lease(id.as_str(), lease) {
                debug!(task_id = %id, lease, error = %error, "dropping failure of a task no longer in flight");
                return;
            }
            let Some(flight) = state.in_flight.remove(id.as_str()) else {
                return;
            };
            let mut record = flight.record;
            record.record_failure(now, error);

            let retry_in = if record.is_exhausted() {
                record.mark_failed(now);
                state.total_failed += 1;
                state.failed.push(record.clone());
                state.settling += 1;
                None
            } else {
                record.mark_retrying();
                state.retrying.insert(
                    id.clone(),
                    Parked {
                        record: record.clone(),
                        lease,
                    },
                );
                Some(self.inner.retry_policy.next_delay(record.attempts))
            };
            self.inner
                .events
                .emit(self.inner.lifecycle(&state, &record, now));
            (record, retry_in)
        };

        let error = record.last_error_message().unwrap_or_default();

        match retry_in {
            Some(delay) => {
                info!(
                    task_id = %id,
                    kind = %record.kind,
                    attempts = record.attempts,
                    max_attempts = record.max_attempts,
                    delay = ?delay,
                    error = %error,
                    "task failed, retry scheduled"
                );
                tokio::spawn(self.clone().requeue_after(id, lease, delay));
                self.inner.idle.notify_waiters();
                self.dispatch();
            }
            None => {
                warn!(
                    task_id = %id,
                    kind = %record.kind,
                    attempts = record.attempts,
                    error = %error,
                    "task failed permanently"
                );
                self.dispatch();
                for hook in self.inner.hooks() {
                    hook.on_failed(&record).await;
                }
                self.inner.settle();
            }
        }
    }

    /// Put a parked task back in line once its delay ran out, unless it was
    /// cancelled (or re-admitted under a new lease) in the meantime.
    async fn requeue_after(self, id: TaskId, lease: u64, delay: Duration) {
        tokio::time::sleep(delay).await;

        let now = self.inner.clock.now();
        {
            let mut state = self.inner.lock();
            let still_parked = state
                .retrying
                .get(id.as_str())
                .is_some_and(|parked| parked.lease == lease);
            if !still_parked {
                debug!(task_id = %id, "retry skipped, task left the retry wait");
                return;
            }
            let Some(parked) = state.retrying.remove(id.as_str()) else {
                return;
            };
            let mut record = parked.record;
            record.requeue();
            let position = state.insert_pending(record);
            self.inner
                .events
                .emit(self.inner.lifecycle(&state, &state.pending[position], now));
        }

        debug!(task_id = %id, kind = %self.kind(), "task re-queued for retry");
        self.dispatch();
    }

    /// Cancel a pending, executing or retry-waiting task.
    ///
    /// Executing tasks are dropped from the queue at once; their token fires
    /// and whatever the processor reports afterwards is ignored.
    pub async fn cancel(&self, id: &str) -> bool {
        let now = self.inner.clock.now();
        let (record, freed_slot) = {
            let mut state = self.inner.lock();
            let (mut record, freed_slot) = if let Some(record) = state.remove_pending(id) {
                (record, false)
            } else if let Some(flight) = state.in_flight.remove(id) {
                flight.cancel.cancel();
                (flight.record, true)
            } else if let Some(parked) = state.retrying.remove(id) {
                (parked.record, false)
            } else {
                return false;
            };
            record.mark_cancelled(now);
            state.settling += 1;
            self.inner
                .events
                .emit(self.inner.lifecycle(&state, &record, now));
            (record, freed_slot)
        };

        info!(task_id = %id, kind = %record.kind, "task cancelled");
        if freed_slot {
            self.dispatch();
        }
        for hook in self.inner.hooks() {
            hook.on_cancelled(&record).await;
        }
        self.inner.settle();
        true
    }

    pub fn snapshot(&self) -> QueueStatsSnapshot {
        let cutoff = self.inner.cutoff(self.inner.clock.now());
        self.inner.lock().snapshot(self.kind(), cutoff)
    }

    pub fn contents(&self) -> QueueContents<P::Task, P::Output> {
        let limit = self.inner.config.recent_limit;
        let state = self.inner.lock();

        let mut in_flight: Vec<_> = state
            .in_flight
            .values()
            .map(|flight| flight.record.clone())
            .collect();
        in_flight.sort_by_key(|r| r.started_at);

        let mut retrying: Vec<_> = state
            .retrying
            .values()
            .map(|parked| parked.record.clone())
            .collect();
        retrying.sort_by_key(|r| r.last_attempt_at);

        QueueContents {
            pending: state.pending.iter().cloned().collect(),
            in_flight,
            retrying,
            recent_completed: state.completed.recent(limit),
            recent_failed: state.failed.recent(limit),
        }
    }

    /// Look a task up in the live collections and the histories.
    pub fn task(&self, id: &str) -> Option<RecordOf<P>> {
        self.inner.lock().find(id).cloned()
    }

    /// Drop history entries older than the retention window.
    pub fn sweep_history(&self) -> usize {
        let cutoff = self.inner.cutoff(self.inner.clock.now());
        let removed = {
            let mut state = self.inner.lock();
            state.completed.sweep(cutoff) + state.failed.sweep(cutoff)
        };
        if removed > 0 {
            debug!(kind = %self.kind(), removed, "swept task history");
        }
        removed
    }

    /// Drop both histories. Lifetime totals are kept.
    pub fn clear_history(&self) {
        let mut state = self.inner.lock();
        state.completed.clear();
        state.failed.clear();
    }

    /// Stop starting new work. Executing tasks run to completion.
    pub fn pause(&self) {
        self.inner.lock().paused = true;
        info!(kind = %self.kind(), "queue paused");
    }

    pub fn resume(&self) {
        self.inner.lock().paused = false;
        info!(kind = %self.kind(), "queue resumed");
        self.dispatch();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    /// Spawn the dispatch tick and the history sweep. Idempotent.
    pub fn start(&self) {
        let mut loops = self.inner.loops.lock().unwrap_or_else(PoisonError::into_inner);
        if !loops.is_empty() || *self.inner.shutdown_tx.borrow() {
            return;
        }

        loops.push(tokio::spawn(run_every(
            self.downgrade(),
            self.inner.config.tick_interval,
            self.inner.shutdown_tx.subscribe(),
            "dispatch",
            TaskQueue::<P>::dispatch,
        )));
        loops.push(tokio::spawn(run_every(
            self.downgrade(),
            self.inner.config.sweep_interval,
            self.inner.shutdown_tx.subscribe(),
            "history sweep",
            TaskQueue::<P>::sweep_history,
        )));

        info!(
            kind = %self.kind(),
            concurrency = self.inner.config.concurrency,
            "queue started"
        );
    }

    /// Stop accepting and dispatching, stop the loops, then wait up to
    /// `timeout` for executing tasks to finish. Returns whether they did.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.inner.lock().closed = true;
        self.inner.shutdown_tx.send_replace(true);

        let loops = std::mem::take(
            &mut *self
                .inner
                .loops
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in loops {
            if let Err(err) = handle.await {
                warn!(kind = %self.kind(), error = %err, "queue loop ended abnormally");
            }
        }

        let drained = self.wait_idle(timeout).await;
        if drained {
            info!(kind = %self.kind(), "queue shut down");
        } else {
            warn!(
                kind = %self.kind(),
                in_flight = self.in_flight_count(),
                "queue shutdown timed out with tasks still executing"
            );
        }
        drained
    }

    /// Wait until nothing is executing. Returns `false` on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, <StateOf<P>>::is_idle).await
    }

    /// Wait until nothing is executing, queued or waiting for a retry.
    pub async fn wait_drained(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, <StateOf<P>>::is_drained).await
    }

    async fn wait_until(&self, timeout: Duration, done: fn(&StateOf<P>) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let finished = {
                let state = self.inner.lock();
                done(&state)
            };
            if finished {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let state = self.inner.lock();
                return done(&state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, TaskStatus, ValidationError};
    use crate::impls::NoopEventSink;
    use crate::ports::FixedClock;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    enum Behaviour {
        Succeed,
        FailTransient,
        FailPermanent,
        /// Fail transiently on the first attempt only.
        FlakeOnce,
        /// Run until cancelled.
        Hang,
        Panic,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Job {
        id: TaskId,
        weight: u32,
        priority: Priority,
        behaviour: Behaviour,
    }

    impl Job {
        fn new(id: &str, weight: u32, priority: Priority) -> Self {
            Self {
                id: TaskId::from(id),
                weight,
                priority,
                behaviour: Behaviour::Succeed,
            }
        }

        fn behaving(mut self, behaviour: Behaviour) -> Self {
            self.behaviour = behaviour;
            self
        }
    }

    impl QueueTask for Job {
        const KIND: TaskKind = TaskKind::Download;

        fn id(&self) -> &TaskId {
            &self.id
        }

        fn priority(&self) -> Priority {
            self.priority
        }
    }

    #[derive(Default)]
    struct Recorder {
        order: Mutex<Vec<String>>,
        calls: Mutex<HashMap<String, u32>>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    struct TestProcessor {
        recorder: Arc<Recorder>,
    }

    #[async_trait]
    impl TaskProcessor for TestProcessor {
        type Task = Job;
        type Output = String;

        fn type_weight(&self, task: &Job) -> Result<u32, ValidationError> {
            if task.weight > 9 {
                return Err(ValidationError::UnsupportedFileType(task.id.to_string()));
            }
            Ok(task.weight)
        }

        async fn process(&self, task: Job, cancel: CancellationToken) -> Result<String, TaskError> {
            let id = task.id.to_string();
            let call = {
                self.recorder.order.lock().unwrap().push(id.clone());
                let mut calls = self.recorder.calls.lock().unwrap();
                let n = calls.entry(id.clone()).or_default();
                *n += 1;
                *n
            };
            let running = self.recorder.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.recorder.peak.fetch_max(running, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(50)).await;
            let result = match task.behaviour {
                Behaviour::Succeed => Ok(format!("done:{id}")),
                Behaviour::FailTransient => Err(TaskError::transient("printer offline")),
                Behaviour::FailPermanent => Err(TaskError::permanent("file not found")),
                Behaviour::FlakeOnce if call == 1 => Err(TaskError::transient("timeout")),
                Behaviour::FlakeOnce => Ok(format!("done:{id}")),
                Behaviour::Hang => {
                    cancel.cancelled().await;
                    Err(TaskError::cancelled())
                }
                Behaviour::Panic => panic!("processor blew up"),
            };

            self.recorder.running.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<DomainEvent>>,
    }

    impl EventSink for CollectingSink {
        fn emit(&self, event: DomainEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl CollectingSink {
        fn statuses_for(&self, id: &str) -> Vec<TaskStatus> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    DomainEvent::TaskLifecycle(ev) if ev.task_id.as_str() == id => Some(ev.status),
                    _ => None,
                })
                .collect()
        }
    }

    #[derive(Default)]
    struct CountingHook {
        completed: AtomicUsize,
        failed: AtomicUsize,
        cancelled: AtomicUsize,
    }

    #[async_trait]
    impl CompletionHook<TestProcessor> for CountingHook {
        async fn on_completed(&self, _record: &RecordOf<TestProcessor>) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_failed(&self, _record: &RecordOf<TestProcessor>) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_cancelled(&self, _record: &RecordOf<TestProcessor>) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        queue: TaskQueue<TestProcessor>,
        recorder: Arc<Recorder>,
        sink: Arc<CollectingSink>,
        hook: Arc<CountingHook>,
        clock: Arc<FixedClock>,
    }

    fn harness(config: QueueConfig) -> Harness {
        let recorder = Arc::new(Recorder::default());
        let sink = Arc::new(CollectingSink::default());
        let hook = Arc::new(CountingHook::default());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap(),
        ));
        let queue = TaskQueue::new(
            TestProcessor {
                recorder: Arc::clone(&recorder),
            },
            config,
            clock.clone(),
            sink.clone(),
        )
        .unwrap();
        queue.add_hook(hook.clone());
        Harness {
            queue,
            recorder,
            sink,
            hook,
            clock,
        }
    }

    const WAIT: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn runs_in_priority_then_fifo_order() {
        let h = harness(QueueConfig::default());
        h.queue.pause();

        // key 23: stl at normal priority
        h.queue.enqueue(Job::new("stl", 2, Priority::Normal));
        // key 13: 3mf at normal priority, ahead of the stl despite arriving later
        h.queue.enqueue(Job::new("3mf", 1, Priority::Normal));
        h.queue.enqueue(Job::new("urgent-a", 0, Priority::Urgent));
        h.queue.enqueue(Job::new("urgent-b", 0, Priority::Urgent));
        h.queue.enqueue(Job::new("low", 0, Priority::Low));

        let keys: Vec<u32> = h
            .queue
            .contents()
            .pending
            .iter()
            .map(|r| r.priority_key)
            .collect();
        assert_eq!(keys, vec![1, 1, 4, 13, 23]);

        h.queue.resume();
        assert!(h.queue.wait_drained(WAIT).await);

        let order = h.recorder.order.lock().unwrap().clone();
        assert_eq!(order, vec!["urgent-a", "urgent-b", "low", "3mf", "stl"]);
        assert_eq!(h.queue.snapshot().total_completed, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn queued_is_always_emitted_before_processing() {
        let h = harness(QueueConfig {
            concurrency: 4,
            ..QueueConfig::default()
        });
        h.queue.start();

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = h.queue.clone();
                tokio::spawn(async move {
                    for i in 0..10 {
                        queue.enqueue(Job::new(&format!("p{p}-t{i}"), 0, Priority::Normal));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }
        assert!(h.queue.wait_drained(WAIT).await);

        for p in 0..4 {
            for i in 0..10 {
                let statuses = h.sink.statuses_for(&format!("p{p}-t{i}"));
                assert_eq!(
                    statuses,
                    vec![
                        TaskStatus::Queued,
                        TaskStatus::Processing,
                        TaskStatus::Completed
                    ],
                    "task p{p}-t{i}"
                );
            }
        }
        assert!(h.queue.shutdown(WAIT).await);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_ids_are_rejected_while_live() {
        let h = harness(QueueConfig::default());
        h.queue.pause();

        assert!(h.queue.enqueue(Job::new("a", 0, Priority::Normal)));
        let err = h
            .queue
            .try_enqueue(Job::new("a", 0, Priority::High))
            .unwrap_err();
        assert_eq!(err, EnqueueError::Duplicate(TaskId::from("a")));
        assert_eq!(h.queue.snapshot().queued, 1);

        h.queue.resume();
        assert!(h.queue.wait_drained(WAIT).await);

        // Finished tasks no longer block their id.
        assert!(h.queue.enqueue(Job::new("a", 0, Priority::Normal)));
    }

    #[tokio::test]
    async fn validation_failure_never_enters_the_queue() {
        let h = harness(QueueConfig::default());
        let err = h
            .queue
            .try_enqueue(Job::new("bad", 42, Priority::Normal))
            .unwrap_err();
        assert!(matches!(
            err,
            EnqueueError::Rejected {
                reason: ValidationError::UnsupportedFileType(_),
                ..
            }
        ));
        assert_eq!(h.queue.snapshot().queued, 0);
        assert!(h.sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_limit_is_respected() {
        let h = harness(QueueConfig {
            concurrency: 2,
            ..QueueConfig::default()
        });
        for i in 0..6 {
            h.queue.enqueue(Job::new(&format!("t{i}"), 0, Priority::Normal));
        }
        assert_eq!(h.queue.snapshot().processing, 2);
        assert_eq!(h.queue.snapshot().queued, 4);

        assert!(h.queue.wait_drained(WAIT).await);
        assert_eq!(h.recorder.peak.load(Ordering::SeqCst), 2);
        assert_eq!(h.queue.snapshot().total_completed, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_retries_then_fails_when_exhausted() {
        let h = harness(QueueConfig {
            max_attempts: 2,
            ..QueueConfig::default()
        });
        h.queue
            .enqueue(Job::new("flaky", 0, Priority::Normal).behaving(Behaviour::FailTransient));

        assert!(h.queue.wait_drained(WAIT).await);

        let record = h.queue.task("flaky").unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.attempts, 2);
        assert_eq!(record.last_error_message().as_deref(), Some("printer offline"));
        assert_eq!(h.hook.failed.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.sink.statuses_for("flaky"),
            vec![
                TaskStatus::Queued,
                TaskStatus::Processing,
                TaskStatus::Retrying,
                TaskStatus::Queued,
                TaskStatus::Processing,
                TaskStatus::Failed,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_waits_for_the_configured_delay() {
        let h = harness(QueueConfig::default());
        h.queue
            .enqueue(Job::new("flaky", 0, Priority::Normal).behaving(Behaviour::FlakeOnce));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.queue.snapshot().retrying, 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.queue.snapshot().retrying, 1);

        assert!(h.queue.wait_drained(WAIT).await);
        let record = h.queue.task("flaky").unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.result.as_deref(), Some("done:flaky"));
        assert_eq!(record.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let h = harness(QueueConfig {
            max_attempts: 5,
            ..QueueConfig::default()
        });
        h.queue
            .enqueue(Job::new("gone", 0, Priority::Normal).behaving(Behaviour::FailPermanent));

        assert!(h.queue.wait_drained(WAIT).await);
        let record = h.queue.task("gone").unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.attempts, 1);
        assert_eq!(h.recorder.calls.lock().unwrap()["gone"], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_processor_is_a_transient_failure() {
        let h = harness(QueueConfig {
            max_attempts: 1,
            ..QueueConfig::default()
        });
        h.queue
            .enqueue(Job::new("boom", 0, Priority::Normal).behaving(Behaviour::Panic));

        assert!(h.queue.wait_drained(WAIT).await);
        let record = h.queue.task("boom").unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.last_error.unwrap().is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn execution_timeout_fails_the_attempt() {
        let h = harness(QueueConfig {
            max_attempts: 1,
            execution_timeout: Some(Duration::from_secs(1)),
            ..QueueConfig::default()
        });
        h.queue
            .enqueue(Job::new("slow", 0, Priority::Normal).behaving(Behaviour::Hang));

        assert!(h.queue.wait_drained(WAIT).await);
        let record = h.queue.task("slow").unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.last_error_message().unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_pending_task() {
        let h = harness(QueueConfig::default());
        h.queue.pause();
        h.queue.enqueue(Job::new("a", 0, Priority::Normal));

        assert!(h.queue.cancel("a").await);
        assert!(!h.queue.cancel("a").await);
        assert_eq!(h.queue.snapshot().queued, 0);
        assert_eq!(h.hook.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.sink.statuses_for("a"),
            vec![TaskStatus::Queued, TaskStatus::Cancelled]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_in_flight_frees_the_slot_and_ignores_late_results() {
        let h = harness(QueueConfig::default());
        h.queue
            .enqueue(Job::new("hang", 0, Priority::Normal).behaving(Behaviour::Hang));
        h.queue.enqueue(Job::new("next", 0, Priority::Normal));
        assert_eq!(h.queue.in_flight_count(), 1);

        assert!(h.queue.cancel("hang").await);
        assert!(h.queue.wait_drained(WAIT).await);

        // The cancelled call reported a failure afterwards; it was dropped.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let snapshot = h.queue.snapshot();
        assert_eq!(snapshot.total_completed, 1);
        assert_eq!(snapshot.total_failed, 0);
        assert!(h.queue.task("hang").is_none());
        assert_eq!(h.queue.task("next").unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_retry_wait_suppresses_requeue() {
        let h = harness(QueueConfig::default());
        h.queue
            .enqueue(Job::new("flaky", 0, Priority::Normal).behaving(Behaviour::FlakeOnce));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.queue.snapshot().retrying, 1);
        assert!(h.queue.cancel("flaky").await);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.recorder.calls.lock().unwrap()["flaky"], 1);
        let snapshot = h.queue.snapshot();
        assert_eq!(snapshot.queued + snapshot.processing + snapshot.retrying, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn history_is_swept_after_retention() {
        let h = harness(QueueConfig::default());
        h.queue.enqueue(Job::new("old", 0, Priority::Normal));
        assert!(h.queue.wait_drained(WAIT).await);
        assert_eq!(h.queue.contents().recent_completed.len(), 1);

        h.clock.advance(chrono::Duration::hours(23));
        assert_eq!(h.queue.sweep_history(), 0);

        h.clock.advance(chrono::Duration::hours(2));
        assert_eq!(h.queue.snapshot().completed_recent, 0);
        assert_eq!(h.queue.sweep_history(), 1);
        assert!(h.queue.contents().recent_completed.is_empty());
        assert_eq!(h.queue.snapshot().total_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recent_history_is_newest_first_and_capped() {
        let h = harness(QueueConfig {
            recent_limit: 3,
            ..QueueConfig::default()
        });
        for i in 0..5 {
            h.queue.enqueue(Job::new(&format!("t{i}"), 0, Priority::Normal));
            assert!(h.queue.wait_drained(WAIT).await);
            h.clock.advance(chrono::Duration::seconds(1));
        }

        let ids: Vec<String> = h
            .queue
            .contents()
            .recent_completed
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, vec!["t4", "t3", "t2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_history_keeps_lifetime_totals() {
        let h = harness(QueueConfig::default());
        h.queue.enqueue(Job::new("ok", 0, Priority::Normal));
        h.queue
            .enqueue(Job::new("gone", 0, Priority::Normal).behaving(Behaviour::FailPermanent));
        assert!(h.queue.wait_drained(WAIT).await);

        h.queue.clear_history();

        let contents = h.queue.contents();
        assert!(contents.recent_completed.is_empty());
        assert!(contents.recent_failed.is_empty());
        assert!(h.queue.task("ok").is_none());
        let snapshot = h.queue.snapshot();
        assert_eq!(snapshot.total_completed, 1);
        assert_eq!(snapshot.total_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_rejects_new_work_and_drains() {
        let h = harness(QueueConfig::default());
        h.queue.start();
        h.queue.enqueue(Job::new("a", 0, Priority::Normal));

        assert!(h.queue.shutdown(WAIT).await);
        assert_eq!(
            h.queue.try_enqueue(Job::new("b", 0, Priority::Normal)),
            Err(EnqueueError::ShuttingDown)
        );
        assert_eq!(h.queue.task("a").unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_times_out_on_stuck_task() {
        let h = harness(QueueConfig::default());
        h.queue
            .enqueue(Job::new("hang", 0, Priority::Normal).behaving(Behaviour::Hang));

        assert!(!h.queue.shutdown(Duration::from_secs(1)).await);
        assert_eq!(h.queue.in_flight_count(), 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let recorder = Arc::new(Recorder::default());
        let result = TaskQueue::new(
            TestProcessor { recorder },
            QueueConfig {
                concurrency: 0,
                ..QueueConfig::default()
            },
            Arc::new(FixedClock::new(Utc::now())),
            Arc::new(NoopEventSink),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}

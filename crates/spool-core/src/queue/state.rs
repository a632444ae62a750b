//! Mutable queue state, guarded by one mutex per queue.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tokio_util::sync::CancellationToken;

use super::TaskRecord;
use super::history::History;
use crate::domain::{QueueStatsSnapshot, QueueTask, TaskId, TaskKind};

/// A task currently executing.
#[derive(Debug)]
pub(crate) struct InFlight<T, O> {
    pub(crate) record: TaskRecord<T, O>,
    /// Dispatch sequence number; callbacks carrying another lease are stale.
    pub(crate) lease: u64,
    pub(crate) cancel: CancellationToken,
}

/// A failed task waiting out its retry delay.
#[derive(Debug)]
pub(crate) struct Parked<T, O> {
    pub(crate) record: TaskRecord<T, O>,
    pub(crate) lease: u64,
}

/// Queue collections.
///
/// Design:
/// - A task id lives in at most one of pending / in_flight / retrying.
/// - `pending` is kept sorted by priority key, FIFO among equal keys.
/// - Histories only shrink through the retention sweep.
#[derive(Debug)]
pub(crate) struct QueueState<T, O> {
    pub(crate) pending: VecDeque<TaskRecord<T, O>>,
    pub(crate) in_flight: HashMap<TaskId, InFlight<T, O>>,
    pub(crate) retrying: HashMap<TaskId, Parked<T, O>>,
    pub(crate) completed: History<T, O>,
    pub(crate) failed: History<T, O>,
    pub(crate) total_completed: u64,
    pub(crate) total_failed: u64,
    /// Tasks that left a live collection but whose hooks are still running.
    pub(crate) settling: usize,
    pub(crate) paused: bool,
    /// Set once shutdown starts: no more enqueues, no more dispatch.
    pub(crate) closed: bool,
    next_lease: u64,
}

impl<T, O> Default for QueueState<T, O> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: HashMap::new(),
            retrying: HashMap::new(),
            completed: History::default(),
            failed: History::default(),
            total_completed: 0,
            total_failed: 0,
            settling: 0,
            paused: false,
            closed: false,
            next_lease: 1,
        }
    }
}

impl<T: QueueTask, O: Clone> QueueState<T, O> {
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.in_flight.contains_key(id)
            || self.retrying.contains_key(id)
            || self.pending.iter().any(|r| r.id().as_str() == id)
    }

    /// Insert before the first task with a strictly larger key.
    /// Returns the insertion index.
    pub(crate) fn insert_pending(&mut self, record: TaskRecord<T, O>) -> usize {
        let index = self
            .pending
            .iter()
            .position(|r| r.priority_key > record.priority_key)
            .unwrap_or(self.pending.len());
        self.pending.insert(index, record);
        index
    }

    pub(crate) fn remove_pending(&mut self, id: &str) -> Option<TaskRecord<T, O>> {
        let index = self.pending.iter().position(|r| r.id().as_str() == id)?;
        self.pending.remove(index)
    }

    pub(crate) fn holds_lease(&self, id: &str, lease: u64) -> bool {
        self.in_flight.get(id).is_some_and(|f| f.lease == lease)
    }

    /// Nothing executing and no hook still running.
    pub(crate) fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.settling == 0
    }

    /// Idle, and nothing waiting to run either.
    pub(crate) fn is_drained(&self) -> bool {
        self.is_idle() && self.pending.is_empty() && self.retrying.is_empty()
    }

    pub(crate) fn next_lease(&mut self) -> u64 {
        let lease = self.next_lease;
        self.next_lease += 1;
        lease
    }

    /// Find a record anywhere in the queue, live collections first.
    pub(crate) fn find(&self, id: &str) -> Option<&TaskRecord<T, O>> {
        self.in_flight
            .get(id)
            .map(|f| &f.record)
            .or_else(|| self.retrying.get(id).map(|p| &p.record))
            .or_else(|| self.pending.iter().find(|r| r.id().as_str() == id))
            .or_else(|| self.completed.find(id))
            .or_else(|| self.failed.find(id))
    }

    pub(crate) fn snapshot(&self, kind: TaskKind, cutoff: DateTime<Utc>) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            kind,
            queued: self.pending.len(),
            processing: self.in_flight.len(),
            retrying: self.retrying.len(),
            completed_recent: self.completed.count_since(cutoff),
            failed_recent: self.failed.count_since(cutoff),
            total_completed: self.total_completed,
            total_failed: self.total_failed,
            paused: self.paused,
        }
    }
}

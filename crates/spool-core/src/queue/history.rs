//! Completed/failed history.
//!
//! Entries are kept in insertion order and leave only through the age sweep.
//! "Recent N" is a read-time slice, not a retention rule.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use super::TaskRecord;

#[derive(Debug)]
pub(crate) struct History<T, O> {
    entries: VecDeque<TaskRecord<T, O>>,
}

impl<T, O> Default for History<T, O> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<T: Clone, O: Clone> History<T, O> {
    pub(crate) fn push(&mut self, record: TaskRecord<T, O>) {
        self.entries.push_back(record);
    }

    /// Drop entries that finished before `cutoff`. Returns how many went.
    pub(crate) fn sweep(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|r| r.finished_at().is_none_or(|at| at >= cutoff));
        before - self.entries.len()
    }

    /// Entries that finished at or after `cutoff`.
    pub(crate) fn count_since(&self, cutoff: DateTime<Utc>) -> usize {
        self.entries
            .iter()
            .filter(|r| r.finished_at().is_some_and(|at| at >= cutoff))
            .count()
    }

    /// The most recent `limit` entries, newest first.
    pub(crate) fn recent(&self, limit: usize) -> Vec<TaskRecord<T, O>> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    pub(crate) fn find(&self, id: &str) -> Option<&TaskRecord<T, O>>
    where
        T: crate::domain::QueueTask,
    {
        self.entries.iter().rev().find(|r| r.id().as_str() == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, QueueTask, TaskId, TaskKind};
    use chrono::{Duration, TimeZone};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Probe {
        id: TaskId,
    }

    impl QueueTask for Probe {
        const KIND: TaskKind = TaskKind::Thumbnail;

        fn id(&self) -> &TaskId {
            &self.id
        }

        fn priority(&self) -> Priority {
            Priority::Normal
        }
    }

    fn completed(id: &str, at: DateTime<Utc>) -> TaskRecord<Probe, ()> {
        let mut r = TaskRecord::new(Probe { id: TaskId::new(id) }, 2, 13, at);
        r.mark_completed(at, ());
        r
    }

    #[test]
    fn sweep_removes_only_entries_older_than_cutoff() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut history = History::default();
        history.push(completed("old", t0));
        history.push(completed("new", t0 + Duration::hours(20)));

        let removed = history.sweep(t0 + Duration::hours(1));
        assert_eq!(removed, 1);
        assert_eq!(history.len(), 1);
        assert!(history.find("old").is_none());
        assert!(history.find("new").is_some());
    }

    #[test]
    fn recent_is_a_newest_first_slice_and_does_not_evict() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut history = History::default();
        for i in 0..15 {
            history.push(completed(&format!("t{i}"), t0 + Duration::minutes(i)));
        }

        let recent = history.recent(10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].id().as_str(), "t14");
        assert_eq!(recent[9].id().as_str(), "t5");
        assert_eq!(history.len(), 15);
        assert_eq!(history.count_since(t0 + Duration::minutes(10)), 5);
    }
}

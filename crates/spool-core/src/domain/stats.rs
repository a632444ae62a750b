//! Point-in-time counters. Derived on demand, never stored.

use serde::{Deserialize, Serialize};

use super::TaskKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatsSnapshot {
    pub kind: TaskKind,
    pub queued: usize,
    pub processing: usize,
    pub retrying: usize,
    /// History entries inside the retention window.
    pub completed_recent: usize,
    pub failed_recent: usize,
    pub total_completed: u64,
    pub total_failed: u64,
    pub paused: bool,
}

impl QueueStatsSnapshot {
    pub fn empty(kind: TaskKind) -> Self {
        Self {
            kind,
            queued: 0,
            processing: 0,
            retrying: 0,
            completed_recent: 0,
            failed_recent: 0,
            total_completed: 0,
            total_failed: 0,
            paused: false,
        }
    }

    /// Work that has not reached a terminal state yet.
    pub fn outstanding(&self) -> usize {
        self.queued + self.processing + self.retrying
    }
}

/// Aggregate view over both queues plus manager state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub downloads: QueueStatsSnapshot,
    pub thumbnails: QueueStatsSnapshot,
    pub auto_detection_enabled: bool,
    pub monitored_printer_count: usize,
}

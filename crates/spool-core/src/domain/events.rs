//! Domain events published to the observability sink.

use serde::{Deserialize, Serialize};

use super::{PipelineStats, QueueStatsSnapshot, TaskId, TaskKind, TaskStatus};

/// A status transition of one task, with the queue counters right after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLifecycleEvent {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub stats: QueueStatsSnapshot,
}

/// A thumbnail artifact is available for a file.
///
/// `link_back_id` is the download task that produced the file, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailReadyEvent {
    pub file_id: String,
    pub task_id: TaskId,
    pub link_back_id: Option<TaskId>,
    pub thumbnail_ref: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    TaskLifecycle(TaskLifecycleEvent),
    ThumbnailReady(ThumbnailReadyEvent),
    StatsSnapshot(PipelineStats),
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::TaskLifecycle(_) => "task_lifecycle",
            DomainEvent::ThumbnailReady(_) => "thumbnail_ready",
            DomainEvent::StatsSnapshot(_) => "stats_snapshot",
        }
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            DomainEvent::TaskLifecycle(e) => Some(&e.task_id),
            DomainEvent::ThumbnailReady(e) => Some(&e.task_id),
            DomainEvent::StatsSnapshot(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_event_serializes_with_type_tag() {
        let event = DomainEvent::TaskLifecycle(TaskLifecycleEvent {
            task_id: TaskId::new("t1"),
            kind: TaskKind::Download,
            status: TaskStatus::Retrying,
            attempts: 1,
            last_error: Some("printer offline".into()),
            stats: QueueStatsSnapshot::empty(TaskKind::Download),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_lifecycle");
        assert_eq!(json["status"], "retrying");
        assert_eq!(json["kind"], "download");
        assert_eq!(event.task_id().map(TaskId::as_str), Some("t1"));
    }
}

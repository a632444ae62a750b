//! Downloading the file a printer is working on.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::{Priority, QueueTask, TaskError, TaskId, TaskKind, ValidationError};
use crate::ports::{DownloadExecutor, DownloadedFile};
use crate::queue::TaskProcessor;

/// Fetch `filename` from `printer_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadTask {
    pub id: TaskId,
    pub printer_id: String,
    pub filename: String,
    pub job_id: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    /// Created from a printer event rather than by an operator.
    pub auto_triggered: bool,
}

impl DownloadTask {
    /// Task id used for automatic downloads, so one printer/file pair is only
    /// queued once at a time.
    pub fn derived_id(printer_id: &str, filename: &str) -> TaskId {
        TaskId::new(format!("download-{printer_id}-{filename}"))
    }

    pub fn automatic(printer_id: &str, filename: &str, job_id: Option<String>) -> Self {
        Self {
            id: Self::derived_id(printer_id, filename),
            printer_id: printer_id.to_string(),
            filename: filename.to_string(),
            job_id,
            priority: Priority::Normal,
            auto_triggered: true,
        }
    }

    pub fn manual(id: TaskId, printer_id: &str, filename: &str, priority: Priority) -> Self {
        Self {
            id,
            printer_id: printer_id.to_string(),
            filename: filename.to_string(),
            job_id: None,
            priority,
            auto_triggered: false,
        }
    }
}

impl QueueTask for DownloadTask {
    const KIND: TaskKind = TaskKind::Download;

    fn id(&self) -> &TaskId {
        &self.id
    }

    fn priority(&self) -> Priority {
        self.priority
    }
}

pub struct DownloadProcessor {
    executor: Arc<dyn DownloadExecutor>,
}

impl DownloadProcessor {
    pub fn new(executor: Arc<dyn DownloadExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl TaskProcessor for DownloadProcessor {
    type Task = DownloadTask;
    type Output = DownloadedFile;

    /// Downloads are ordered by priority and arrival only.
    fn type_weight(&self, task: &DownloadTask) -> Result<u32, ValidationError> {
        if task.printer_id.trim().is_empty() {
            return Err(ValidationError::MissingField("printer_id"));
        }
        if task.filename.trim().is_empty() {
            return Err(ValidationError::MissingField("filename"));
        }
        Ok(0)
    }

    async fn process(
        &self,
        task: DownloadTask,
        cancel: CancellationToken,
    ) -> Result<DownloadedFile, TaskError> {
        if cancel.is_cancelled() {
            return Err(TaskError::cancelled());
        }

        debug!(task_id = %task.id, printer_id = %task.printer_id, filename = %task.filename, "downloading");
        tokio::select! {
            _ = cancel.cancelled() => Err(TaskError::cancelled()),
            result = self.executor.execute_download(&task.printer_id, &task.filename) => {
                result.map_err(TaskError::classify)
            }
        }
    }
}

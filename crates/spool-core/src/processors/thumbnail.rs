//! Thumbnail generation for downloaded (or uploaded) files.
//!
//! The method depends on the file format: 3MF archives carry an embedded
//! preview, meshes need rendering and G-code has to be scanned. Cheaper
//! methods get a lower type weight and run first.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::DownloadTask;
use crate::domain::{Priority, QueueTask, TaskError, TaskId, TaskKind, ValidationError};
use crate::ports::{DownloadedFile, ThumbnailExecutor, ThumbnailOutput};
use crate::queue::TaskProcessor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThumbnailMethod {
    Extract,
    Generate,
    Analyze,
}

impl ThumbnailMethod {
    /// Pick the method from the file extension (case-insensitive).
    pub fn for_filename(filename: &str) -> Option<Self> {
        let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "3mf" => Some(Self::Extract),
            "stl" | "obj" => Some(Self::Generate),
            "gcode" | "gco" | "g" | "bgcode" => Some(Self::Analyze),
            _ => None,
        }
    }

    pub fn weight(self) -> u32 {
        match self {
            Self::Extract => 1,
            Self::Generate => 2,
            Self::Analyze => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Generate => "generate",
            Self::Analyze => "analyze",
        }
    }
}

impl fmt::Display for ThumbnailMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produce a thumbnail for one stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailTask {
    pub id: TaskId,
    /// Identifier of the file the thumbnail belongs to.
    pub file_id: String,
    /// Where the executor can read the file.
    pub file_ref: String,
    /// Original name; the extension selects the method.
    pub filename: String,
    pub printer_id: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    /// Download task this thumbnail was chained from.
    pub link_back_id: Option<TaskId>,
}

impl ThumbnailTask {
    /// Follow-up for a completed download: same priority, linked back to it.
    pub fn for_download(download: &DownloadTask, file: &DownloadedFile) -> Self {
        Self {
            id: TaskId::new(format!("thumbnail-{}", download.id)),
            file_id: file.artifact_ref.clone(),
            file_ref: file.artifact_ref.clone(),
            filename: download.filename.clone(),
            printer_id: Some(download.printer_id.clone()),
            priority: download.priority,
            link_back_id: Some(download.id.clone()),
        }
    }

    pub fn method(&self) -> Option<ThumbnailMethod> {
        ThumbnailMethod::for_filename(&self.filename)
    }
}

impl QueueTask for ThumbnailTask {
    const KIND: TaskKind = TaskKind::Thumbnail;

    fn id(&self) -> &TaskId {
        &self.id
    }

    fn priority(&self) -> Priority {
        self.priority
    }
}

/// Result of a thumbnail task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailArtifact {
    pub thumbnail_ref: String,
    pub method: ThumbnailMethod,
    pub message: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

pub struct ThumbnailProcessor {
    executor: Arc<dyn ThumbnailExecutor>,
}

impl ThumbnailProcessor {
    pub fn new(executor: Arc<dyn ThumbnailExecutor>) -> Self {
        Self { executor }
    }

    async fn run(&self, method: ThumbnailMethod, file_ref: &str) -> Result<ThumbnailOutput, String> {
        match method {
            ThumbnailMethod::Extract => self.executor.extract_thumbnail(file_ref).await,
            ThumbnailMethod::Generate => self.executor.generate_thumbnail(file_ref).await,
            ThumbnailMethod::Analyze => self.executor.analyze_for_thumbnail(file_ref).await,
        }
    }
}

#[async_trait]
impl TaskProcessor for ThumbnailProcessor {
    type Task = ThumbnailTask;
    type Output = ThumbnailArtifact;

    fn type_weight(&self, task: &ThumbnailTask) -> Result<u32, ValidationError> {
        if task.file_ref.trim().is_empty() {
            return Err(ValidationError::MissingField("file_ref"));
        }
        task.method()
            .map(ThumbnailMethod::weight)
            .ok_or_else(|| ValidationError::UnsupportedFileType(task.filename.clone()))
    }

    async fn process(
        &self,
        task: ThumbnailTask,
        cancel: CancellationToken,
    ) -> Result<ThumbnailArtifact, TaskError> {
        let method = task.method().ok_or_else(|| {
            TaskError::permanent(format!("unsupported file type: {}", task.filename))
        })?;
        if cancel.is_cancelled() {
            return Err(TaskError::cancelled());
        }

        debug!(task_id = %task.id, file_id = %task.file_id, %method, "generating thumbnail");
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(TaskError::cancelled()),
            result = self.run(method, &task.file_ref) => result.map_err(TaskError::classify)?,
        };

        Ok(ThumbnailArtifact {
            thumbnail_ref: output.thumbnail_ref,
            method,
            message: format!("thumbnail produced by {method} for {}", task.filename),
            metadata: output.metadata,
        })
    }
}

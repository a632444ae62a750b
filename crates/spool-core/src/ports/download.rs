//! Download execution collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What a finished download produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadedFile {
    /// Where the stored file can be found (path, URL, blob key...).
    pub artifact_ref: String,
    pub job_name: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Fetches a file from a printer.
///
/// Errors are opaque strings; the download processor classifies them.
#[async_trait]
pub trait DownloadExecutor: Send + Sync {
    async fn execute_download(&self, printer_id: &str, filename: &str)
    -> Result<DownloadedFile, String>;
}

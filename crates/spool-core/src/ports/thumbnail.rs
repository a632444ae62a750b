//! Thumbnail execution collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailOutput {
    pub thumbnail_ref: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Produces preview images for stored files.
#[async_trait]
pub trait ThumbnailExecutor: Send + Sync {
    /// Pull the preview embedded in a container format (3MF).
    async fn extract_thumbnail(&self, file_ref: &str) -> Result<ThumbnailOutput, String>;

    /// Render a preview from mesh geometry (STL, OBJ).
    async fn generate_thumbnail(&self, file_ref: &str) -> Result<ThumbnailOutput, String>;

    /// Scan an instruction stream (G-code) for preview data and metadata.
    async fn analyze_for_thumbnail(&self, file_ref: &str) -> Result<ThumbnailOutput, String>;
}

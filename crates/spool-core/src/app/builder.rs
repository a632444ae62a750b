//! PipelineBuilder - wiring of queues, hooks and collaborators.
//!
//! Validation happens here, at startup: a missing executor or a bad config
//! is a `BuildError`, never a runtime surprise.

use std::sync::Arc;

use super::hooks::{ChainThumbnailHook, ThumbnailReadyHook};
use super::manager::PipelineManager;
use super::printers::PrinterRegistry;
use crate::config::{ConfigError, PipelineConfig};
use crate::impls::EventBus;
use crate::ports::{Clock, DownloadExecutor, EventSink, SystemClock, ThumbnailExecutor, UlidGenerator};
use crate::processors::{DownloadProcessor, ThumbnailProcessor};
use crate::queue::TaskQueue;

/// Builds a [`PipelineManager`].
///
/// # Example
/// ```ignore
/// let manager = PipelineBuilder::new(PipelineConfig::default())
///     .download_executor(Arc::new(MyDownloader))
///     .thumbnail_executor(Arc::new(MyThumbnailer))
///     .build()?;
/// manager.start();
/// ```
pub struct PipelineBuilder {
    config: PipelineConfig,
    download_executor: Option<Arc<dyn DownloadExecutor>>,
    thumbnail_executor: Option<Arc<dyn ThumbnailExecutor>>,
    clock: Option<Arc<dyn Clock>>,
    event_bus: Option<EventBus>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            download_executor: None,
            thumbnail_executor: None,
            clock: None,
            event_bus: None,
        }
    }

    pub fn download_executor(mut self, executor: Arc<dyn DownloadExecutor>) -> Self {
        self.download_executor = Some(executor);
        self
    }

    pub fn thumbnail_executor(mut self, executor: Arc<dyn ThumbnailExecutor>) -> Self {
        self.thumbnail_executor = Some(executor);
        self
    }

    /// Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share an existing bus. By default one is created with the configured
    /// `event_capacity`.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn build(self) -> Result<PipelineManager, BuildError> {
        self.config.validate()?;
        let download_executor = self
            .download_executor
            .ok_or(BuildError::MissingCollaborator("download executor"))?;
        let thumbnail_executor = self
            .thumbnail_executor
            .ok_or(BuildError::MissingCollaborator("thumbnail executor"))?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let bus = self
            .event_bus
            .unwrap_or_else(|| EventBus::with_clock(self.config.event_capacity, Arc::clone(&clock)));
        let sink: Arc<dyn EventSink> = Arc::new(bus.clone());

        let downloads = TaskQueue::new(
            DownloadProcessor::new(download_executor),
            self.config.downloads.clone(),
            Arc::clone(&clock),
            Arc::clone(&sink),
        )?;
        let thumbnails = TaskQueue::new(
            ThumbnailProcessor::new(thumbnail_executor),
            self.config.thumbnails.clone(),
            Arc::clone(&clock),
            Arc::clone(&sink),
        )?;

        let printers = Arc::new(PrinterRegistry::default());
        downloads.add_hook(Arc::new(ChainThumbnailHook::new(
            thumbnails.clone(),
            Arc::clone(&printers),
        )));
        thumbnails.add_hook(Arc::new(ThumbnailReadyHook::new(
            sink,
            Arc::clone(&printers),
        )));

        Ok(PipelineManager::from_parts(
            self.config,
            downloads,
            thumbnails,
            printers,
            Box::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
            bus,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{DownloadedFile, ThumbnailOutput};
    use async_trait::async_trait;

    struct NullDownloader;

    #[async_trait]
    impl DownloadExecutor for NullDownloader {
        async fn execute_download(&self, _: &str, _: &str) -> Result<DownloadedFile, String> {
            Err("offline".into())
        }
    }

    struct NullThumbnailer;

    #[async_trait]
    impl ThumbnailExecutor for NullThumbnailer {
        async fn extract_thumbnail(&self, _: &str) -> Result<ThumbnailOutput, String> {
            Err("offline".into())
        }

        async fn generate_thumbnail(&self, _: &str) -> Result<ThumbnailOutput, String> {
            Err("offline".into())
        }

        async fn analyze_for_thumbnail(&self, _: &str) -> Result<ThumbnailOutput, String> {
            Err("offline".into())
        }
    }

    #[test]
    fn test_build_success() {
        let manager = PipelineBuilder::new(PipelineConfig::default())
            .download_executor(Arc::new(NullDownloader))
            .thumbnail_executor(Arc::new(NullThumbnailer))
            .build()
            .unwrap();
        let stats = manager.stats();
        assert!(stats.auto_detection_enabled);
        assert_eq!(stats.monitored_printer_count, 0);
    }

    #[test]
    fn test_build_missing_executor() {
        let result = PipelineBuilder::new(PipelineConfig::default())
            .download_executor(Arc::new(NullDownloader))
            .build();
        assert!(matches!(
            result,
            Err(BuildError::MissingCollaborator("thumbnail executor"))
        ));
    }

    #[test]
    fn test_build_invalid_config() {
        let mut config = PipelineConfig::default();
        config.thumbnails.max_attempts = 0;
        let result = PipelineBuilder::new(config)
            .download_executor(Arc::new(NullDownloader))
            .thumbnail_executor(Arc::new(NullThumbnailer))
            .build();
        assert!(matches!(result, Err(BuildError::Config(ConfigError::Invalid(_)))));
    }
}

//! Completion hooks wiring the two queues and the printer registry together.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::printers::PrinterRegistry;
use crate::domain::{DomainEvent, EnqueueError, ThumbnailReadyEvent};
use crate::ports::EventSink;
use crate::processors::{DownloadProcessor, ThumbnailProcessor, ThumbnailTask};
use crate::queue::{CompletionHook, RecordOf, TaskQueue};

/// Chains a thumbnail task onto every completed download.
pub struct ChainThumbnailHook {
    thumbnails: TaskQueue<ThumbnailProcessor>,
    printers: Arc<PrinterRegistry>,
}

impl ChainThumbnailHook {
    pub fn new(thumbnails: TaskQueue<ThumbnailProcessor>, printers: Arc<PrinterRegistry>) -> Self {
        Self {
            thumbnails,
            printers,
        }
    }
}

#[async_trait]
impl CompletionHook<DownloadProcessor> for ChainThumbnailHook {
    async fn on_completed(&self, record: &RecordOf<DownloadProcessor>) {
        let download = &record.task;
        let Some(file) = record.result.as_ref() else {
            return;
        };
        let thumbnail = ThumbnailTask::for_download(download, file);
        let thumbnail_id = thumbnail.id.clone();

        // Registered first: the thumbnail may finish before try_enqueue returns.
        self.printers
            .download_finished(&download.printer_id, &download.id, thumbnail_id.clone());

        match self.thumbnails.try_enqueue(thumbnail) {
            Ok(()) => {
                info!(download_id = %download.id, thumbnail_id = %thumbnail_id, "thumbnail chained");
            }
            Err(EnqueueError::Duplicate(_)) => {
                debug!(thumbnail_id = %thumbnail_id, "thumbnail already queued");
            }
            Err(EnqueueError::Rejected { reason, .. }) => {
                info!(download_id = %download.id, reason = %reason, "no thumbnail for this file");
                self.printers
                    .thumbnail_finished(&download.printer_id, &thumbnail_id);
            }
            Err(err @ EnqueueError::ShuttingDown) => {
                warn!(download_id = %download.id, error = %err, "thumbnail not chained");
                self.printers
                    .thumbnail_finished(&download.printer_id, &thumbnail_id);
            }
        }
    }

    async fn on_failed(&self, record: &RecordOf<DownloadProcessor>) {
        self.printers
            .download_abandoned(&record.task.printer_id, &record.task.id);
    }

    async fn on_cancelled(&self, record: &RecordOf<DownloadProcessor>) {
        self.printers
            .download_abandoned(&record.task.printer_id, &record.task.id);
    }
}

/// Announces finished thumbnails and releases the printer.
pub struct ThumbnailReadyHook {
    events: Arc<dyn EventSink>,
    printers: Arc<PrinterRegistry>,
}

impl ThumbnailReadyHook {
    pub fn new(events: Arc<dyn EventSink>, printers: Arc<PrinterRegistry>) -> Self {
        Self { events, printers }
    }

    fn release(&self, task: &ThumbnailTask) {
        if let Some(printer_id) = &task.printer_id {
            self.printers.thumbnail_finished(printer_id, &task.id);
        }
    }
}

#[async_trait]
impl CompletionHook<ThumbnailProcessor> for ThumbnailReadyHook {
    async fn on_completed(&self, record: &RecordOf<ThumbnailProcessor>) {
        let task = &record.task;
        if let Some(artifact) = &record.result {
            self.events
                .emit(DomainEvent::ThumbnailReady(ThumbnailReadyEvent {
                    file_id: task.file_id.clone(),
                    task_id: task.id.clone(),
                    link_back_id: task.link_back_id.clone(),
                    thumbnail_ref: artifact.thumbnail_ref.clone(),
                }));
        }
        self.release(task);
    }

    async fn on_failed(&self, record: &RecordOf<ThumbnailProcessor>) {
        self.release(&record.task);
    }

    async fn on_cancelled(&self, record: &RecordOf<ThumbnailProcessor>) {
        self.release(&record.task);
    }
}

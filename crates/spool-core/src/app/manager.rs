//! PipelineManager - the orchestration surface.
//!
//! Owns the download and thumbnail queues, turns printer notifications into
//! download tasks and exposes the operator actions (manual requests, cancel,
//! auto-detection toggle, stats).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::printers::{PrinterPhase, PrinterRegistry, PrinterTracking};
use super::status::stats_loop;
use crate::config::PipelineConfig;
use crate::domain::{EnqueueError, PipelineStats, PrinterEvent, Priority, TaskId};
use crate::impls::{EventBus, EventReceiver};
use crate::ports::{Clock, IdGenerator};
use crate::processors::{DownloadProcessor, DownloadTask, ThumbnailProcessor, ThumbnailTask};
use crate::queue::TaskQueue;

pub(super) struct ManagerInner {
    config: PipelineConfig,
    downloads: TaskQueue<DownloadProcessor>,
    thumbnails: TaskQueue<ThumbnailProcessor>,
    printers: Arc<PrinterRegistry>,
    auto_detection: AtomicBool,
    ids: Box<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    started: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl ManagerInner {
    pub(super) fn stats(&self) -> PipelineStats {
        PipelineStats {
            downloads: self.downloads.snapshot(),
            thumbnails: self.thumbnails.snapshot(),
            auto_detection_enabled: self.auto_detection.load(Ordering::SeqCst),
            monitored_printer_count: self.printers.len(),
        }
    }

    pub(super) fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn handle_printer_event(&self, event: &PrinterEvent) -> Option<TaskId> {
        if !self.auto_detection.load(Ordering::SeqCst) {
            trace!(printer_id = %event.printer_id, "auto detection disabled, event ignored");
            return None;
        }

        self.printers.observe(event, self.clock.now());
        let file = event.active_file()?;
        let job_id = event.job_id.as_deref();
        if !self.printers.should_download(&event.printer_id, file, job_id) {
            debug!(printer_id = %event.printer_id, file, "file already handled");
            return None;
        }

        let task = DownloadTask::automatic(&event.printer_id, file, event.job_id.clone());
        let id = task.id.clone();
        self.printers.begin_download(
            &event.printer_id,
            file,
            event.job_id.clone(),
            id.clone(),
            self.clock.now(),
        );

        match self.downloads.try_enqueue(task) {
            Ok(()) => {
                info!(printer_id = %event.printer_id, file, task_id = %id, "automatic download queued");
                Some(id)
            }
            Err(EnqueueError::Duplicate(_)) => {
                debug!(task_id = %id, "download already queued");
                None
            }
            Err(err) => {
                warn!(printer_id = %event.printer_id, file, error = %err, "automatic download rejected");
                self.printers.download_abandoned(&event.printer_id, &id);
                None
            }
        }
    }
}

/// Cheap to clone; clones share the same pipeline.
#[derive(Clone)]
pub struct PipelineManager {
    inner: Arc<ManagerInner>,
}

impl PipelineManager {
    pub(super) fn from_parts(
        config: PipelineConfig,
        downloads: TaskQueue<DownloadProcessor>,
        thumbnails: TaskQueue<ThumbnailProcessor>,
        printers: Arc<PrinterRegistry>,
        ids: Box<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        bus: EventBus,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ManagerInner {
                auto_detection: AtomicBool::new(config.auto_detection),
                config,
                downloads,
                thumbnails,
                printers,
                ids,
                clock,
                bus,
                started: AtomicBool::new(false),
                shutdown_tx,
                background: Mutex::new(Vec::new()),
            }),
        }
    }

    /// React to a printer notification. Returns the id of the download task
    /// it queued, if any.
    pub fn handle_printer_event(&self, event: &PrinterEvent) -> Option<TaskId> {
        self.inner.handle_printer_event(event)
    }

    /// Operator-initiated download. Works with auto detection off.
    pub fn request_download(
        &self,
        printer_id: &str,
        filename: &str,
        priority: Priority,
    ) -> Result<TaskId, EnqueueError> {
        let id = self.inner.ids.generate_task_id("manual");
        let task = DownloadTask::manual(id.clone(), printer_id, filename, priority);
        self.inner.downloads.try_enqueue(task)?;
        info!(task_id = %id, printer_id, filename, %priority, "manual download queued");
        Ok(id)
    }

    /// Operator-initiated thumbnail for a file that is already stored.
    pub fn request_thumbnail(
        &self,
        file_id: &str,
        file_ref: &str,
        filename: &str,
        priority: Priority,
    ) -> Result<TaskId, EnqueueError> {
        let id = self.inner.ids.generate_task_id("thumbnail");
        let task = ThumbnailTask {
            id: id.clone(),
            file_id: file_id.to_string(),
            file_ref: file_ref.to_string(),
            filename: filename.to_string(),
            printer_id: None,
            priority,
            link_back_id: None,
        };
        self.inner.thumbnails.try_enqueue(task)?;
        info!(task_id = %id, file_id, filename, %priority, "manual thumbnail queued");
        Ok(id)
    }

    pub async fn cancel_download(&self, id: &str) -> bool {
        self.inner.downloads.cancel(id).await
    }

    pub async fn cancel_thumbnail(&self, id: &str) -> bool {
        self.inner.thumbnails.cancel(id).await
    }

    pub fn stats(&self) -> PipelineStats {
        self.inner.stats()
    }

    pub fn set_auto_detection(&self, enabled: bool) {
        let was = self.inner.auto_detection.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            info!(enabled, "auto detection toggled");
        }
    }

    pub fn auto_detection_enabled(&self) -> bool {
        self.inner.auto_detection.load(Ordering::SeqCst)
    }

    pub fn printer_phase(&self, printer_id: &str) -> Option<PrinterPhase> {
        self.inner.printers.phase(printer_id)
    }

    pub fn printer(&self, printer_id: &str) -> Option<PrinterTracking> {
        self.inner.printers.get(printer_id)
    }

    pub fn downloads(&self) -> &TaskQueue<DownloadProcessor> {
        &self.inner.downloads
    }

    pub fn thumbnails(&self) -> &TaskQueue<ThumbnailProcessor> {
        &self.inner.thumbnails
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.inner.bus.subscribe()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Feed printer notifications from `rx` until shutdown or until every
    /// sender is gone.
    pub fn spawn_event_source(&self, rx: mpsc::Receiver<PrinterEvent>) {
        let handle = tokio::spawn(event_source_loop(
            Arc::downgrade(&self.inner),
            rx,
            self.inner.shutdown_tx.subscribe(),
        ));
        self.inner
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Start both queues and the periodic stats publisher. Idempotent.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.downloads.start();
        self.inner.thumbnails.start();

        let handle = tokio::spawn(stats_loop(
            Arc::downgrade(&self.inner),
            self.inner.config.stats_interval,
            self.inner.shutdown_tx.subscribe(),
        ));
        self.inner
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);

        info!(
            auto_detection = self.auto_detection_enabled(),
            "pipeline started"
        );
    }

    /// Stop background loops, then drain downloads before thumbnails so that
    /// late completions can still chain. Returns whether both queues drained
    /// within `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        self.inner.shutdown_tx.send_replace(true);

        let background = std::mem::take(
            &mut *self
                .inner
                .background
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in background {
            if let Err(err) = handle.await {
                warn!(error = %err, "background task ended abnormally");
            }
        }

        let downloads = self.inner.downloads.shutdown(remaining(deadline)).await;
        let thumbnails = self.inner.thumbnails.shutdown(remaining(deadline)).await;
        info!(downloads, thumbnails, "pipeline shut down");
        downloads && thumbnails
    }
}

fn remaining(deadline: tokio::time::Instant) -> Duration {
    deadline.saturating_duration_since(tokio::time::Instant::now())
}

async fn event_source_loop(
    manager: Weak<ManagerInner>,
    mut rx: mpsc::Receiver<PrinterEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let event = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            event = rx.recv() => event,
        };

        let Some(event) = event else {
            debug!("printer event source closed");
            break;
        };
        let Some(manager) = manager.upgrade() else {
            break;
        };
        manager.handle_printer_event(&event);
    }
}

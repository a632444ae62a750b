//! Per-printer pipeline tracking.
//!
//! Each printer walks `idle -> download_pending -> thumbnail_pending -> idle`.
//! Transitions are keyed by task id: a completion for a task the printer no
//! longer tracks (superseded by a newer job) changes nothing.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{PrinterEvent, PrinterEventType, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterPhase {
    #[default]
    Idle,
    DownloadPending,
    ThumbnailPending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterTracking {
    pub printer_id: String,
    pub phase: PrinterPhase,
    /// File the printer last reported as printing.
    pub current_file: Option<String>,
    pub job_id: Option<String>,
    /// File the running pipeline is working on.
    pub pipeline_file: Option<String>,
    pub download_task: Option<TaskId>,
    pub thumbnail_task: Option<TaskId>,
    /// Last (file, job) pair a pipeline was started for. Cleared when the
    /// printer reports the job over.
    pub last_processed: Option<(String, Option<String>)>,
    pub last_event_at: DateTime<Utc>,
}

impl PrinterTracking {
    fn new(printer_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            printer_id: printer_id.to_string(),
            phase: PrinterPhase::Idle,
            current_file: None,
            job_id: None,
            pipeline_file: None,
            download_task: None,
            thumbnail_task: None,
            last_processed: None,
            last_event_at: now,
        }
    }

    fn reset(&mut self) {
        self.phase = PrinterPhase::Idle;
        self.pipeline_file = None;
        self.download_task = None;
        self.thumbnail_task = None;
    }
}

#[derive(Debug, Default)]
pub struct PrinterRegistry {
    printers: Mutex<HashMap<String, PrinterTracking>>,
}

impl PrinterRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, PrinterTracking>> {
        self.printers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the printer (if new) and record what it reports.
    pub fn observe(&self, event: &PrinterEvent, now: DateTime<Utc>) {
        let mut printers = self.lock();
        let tracking = printers
            .entry(event.printer_id.clone())
            .or_insert_with(|| PrinterTracking::new(&event.printer_id, now));
        tracking.last_event_at = now;

        match event.event_type {
            PrinterEventType::JobStarted
            | PrinterEventType::JobUpdated
            | PrinterEventType::StatusUpdate => {
                if event.current_file.is_some() {
                    tracking.current_file = event.current_file.clone();
                }
                if event.job_id.is_some() {
                    tracking.job_id = event.job_id.clone();
                }
            }
            PrinterEventType::JobCompleted
            | PrinterEventType::JobCancelled
            | PrinterEventType::Disconnected => {
                tracking.current_file = None;
                tracking.job_id = None;
                // A later print of the same file is a new job, even without a job id.
                tracking.last_processed = None;
            }
        }
    }

    /// Whether an automatic download should start for `file` / `job_id`.
    ///
    /// No when this pair was already handled, or when a pipeline for the same
    /// file is still running.
    pub fn should_download(&self, printer_id: &str, file: &str, job_id: Option<&str>) -> bool {
        let printers = self.lock();
        let Some(tracking) = printers.get(printer_id) else {
            return true;
        };

        let already_processed = tracking
            .last_processed
            .as_ref()
            .is_some_and(|(f, j)| f == file && j.as_deref() == job_id);
        let same_file_running = tracking.phase != PrinterPhase::Idle
            && tracking.pipeline_file.as_deref() == Some(file);

        !(already_processed || same_file_running)
    }

    pub fn begin_download(
        &self,
        printer_id: &str,
        file: &str,
        job_id: Option<String>,
        task_id: TaskId,
        now: DateTime<Utc>,
    ) {
        let mut printers = self.lock();
        let tracking = printers
            .entry(printer_id.to_string())
            .or_insert_with(|| PrinterTracking::new(printer_id, now));
        tracking.phase = PrinterPhase::DownloadPending;
        tracking.pipeline_file = Some(file.to_string());
        tracking.download_task = Some(task_id);
        tracking.thumbnail_task = None;
        tracking.last_processed = Some((file.to_string(), job_id));
    }

    /// The tracked download finished and `thumbnail_task` follows it.
    pub fn download_finished(&self, printer_id: &str, download: &TaskId, thumbnail_task: TaskId) {
        self.transition(printer_id, |t| {
            if t.download_task.as_ref() != Some(download) {
                return false;
            }
            t.phase = PrinterPhase::ThumbnailPending;
            t.thumbnail_task = Some(thumbnail_task);
            true
        });
    }

    /// The tracked download failed or was cancelled.
    pub fn download_abandoned(&self, printer_id: &str, download: &TaskId) {
        self.transition(printer_id, |t| {
            if t.download_task.as_ref() != Some(download) {
                return false;
            }
            t.reset();
            true
        });
    }

    /// The tracked thumbnail reached a terminal state (or never started).
    pub fn thumbnail_finished(&self, printer_id: &str, thumbnail: &TaskId) {
        self.transition(printer_id, |t| {
            if t.thumbnail_task.as_ref() != Some(thumbnail) {
                return false;
            }
            t.reset();
            true
        });
    }

    fn transition(&self, printer_id: &str, apply: impl FnOnce(&mut PrinterTracking) -> bool) {
        let mut printers = self.lock();
        let Some(tracking) = printers.get_mut(printer_id) else {
            return;
        };
        let before = tracking.phase;
        if apply(tracking) {
            debug!(printer_id, from = ?before, to = ?tracking.phase, "printer phase changed");
        }
    }

    pub fn phase(&self, printer_id: &str) -> Option<PrinterPhase> {
        self.lock().get(printer_id).map(|t| t.phase)
    }

    pub fn get(&self, printer_id: &str) -> Option<PrinterTracking> {
        self.lock().get(printer_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

//! Printer notifications consumed by the pipeline manager.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterEventType {
    StatusUpdate,
    JobStarted,
    JobUpdated,
    JobCompleted,
    JobCancelled,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterEvent {
    pub printer_id: String,
    pub event_type: PrinterEventType,
    #[serde(default)]
    pub current_file: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
}

impl PrinterEvent {
    pub fn new(printer_id: impl Into<String>, event_type: PrinterEventType) -> Self {
        Self {
            printer_id: printer_id.into(),
            event_type,
            current_file: None,
            job_id: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.current_file = Some(file.into());
        self
    }

    pub fn with_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// The file being printed, if this event says a job is active.
    ///
    /// Job start/update events qualify, as do status updates that carry a job
    /// id. Blank file names are ignored.
    pub fn active_file(&self) -> Option<&str> {
        let job_active = match self.event_type {
            PrinterEventType::JobStarted | PrinterEventType::JobUpdated => true,
            PrinterEventType::StatusUpdate => self.job_id.as_deref().is_some_and(|j| !j.is_empty()),
            _ => false,
        };
        if !job_active {
            return None;
        }
        self.current_file
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }
}

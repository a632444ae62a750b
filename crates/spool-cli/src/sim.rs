//! Simulated printers and remote executors for the demo binary.
//!
//! File names steer the outcome:
//! - `flaky*` fails its first download attempt with a transient error
//! - `missing*` fails permanently ("file not found")
//! - extensions outside 3mf/stl/obj/gcode get no thumbnail

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use spool_core::ports::{DownloadExecutor, DownloadedFile, ThumbnailExecutor, ThumbnailOutput};
use spool_core::{PrinterEvent, PrinterEventType};
use tokio::sync::mpsc;
use tracing::debug;

pub const FILES: [&str; 6] = [
    "benchy.3mf",
    "bracket.stl",
    "vase.gcode",
    "flaky_gear.3mf",
    "missing_part.stl",
    "plate.ufp",
];

pub struct SimDownloader {
    latency: Duration,
    failed_once: Mutex<HashSet<String>>,
}

impl SimDownloader {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            failed_once: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl DownloadExecutor for SimDownloader {
    async fn execute_download(
        &self,
        printer_id: &str,
        filename: &str,
    ) -> Result<DownloadedFile, String> {
        tokio::time::sleep(self.latency).await;

        if filename.starts_with("missing") {
            return Err(format!("{filename}: file not found on {printer_id}"));
        }
        if filename.starts_with("flaky") {
            let key = format!("{printer_id}/{filename}");
            let first = self
                .failed_once
                .lock()
                .map_err(|e| e.to_string())?
                .insert(key);
            if first {
                return Err(format!("{printer_id} offline"));
            }
        }

        Ok(DownloadedFile {
            artifact_ref: format!("store/{printer_id}/{filename}"),
            job_name: filename.rsplit_once('.').map(|(stem, _)| stem.to_string()),
            metadata: serde_json::json!({ "printer": printer_id }),
        })
    }
}

pub struct SimThumbnailer {
    latency: Duration,
}

impl SimThumbnailer {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    async fn produce(&self, method: &str, file_ref: &str) -> Result<ThumbnailOutput, String> {
        tokio::time::sleep(self.latency).await;
        Ok(ThumbnailOutput {
            thumbnail_ref: format!("{file_ref}.{method}.png"),
            metadata: None,
        })
    }
}

#[async_trait]
impl ThumbnailExecutor for SimThumbnailer {
    async fn extract_thumbnail(&self, file_ref: &str) -> Result<ThumbnailOutput, String> {
        self.produce("extract", file_ref).await
    }

    async fn generate_thumbnail(&self, file_ref: &str) -> Result<ThumbnailOutput, String> {
        self.produce("generate", file_ref).await
    }

    async fn analyze_for_thumbnail(&self, file_ref: &str) -> Result<ThumbnailOutput, String> {
        tokio::time::sleep(self.latency).await;
        Ok(ThumbnailOutput {
            thumbnail_ref: format!("{file_ref}.analyze.png"),
            metadata: Some(serde_json::json!({ "layers": 120 })),
        })
    }
}

/// Each printer prints `jobs` files one after another, reporting start,
/// progress and completion.
pub async fn run_printers(
    printers: usize,
    jobs: usize,
    pace: Duration,
    tx: mpsc::Sender<PrinterEvent>,
) {
    for job in 0..jobs {
        for p in 0..printers {
            let printer_id = format!("printer-{}", p + 1);
            let file = FILES[(job * printers + p) % FILES.len()];
            let job_id = format!("job-{}", job + 1);

            let events = [
                PrinterEvent::new(&printer_id, PrinterEventType::JobStarted)
                    .with_file(file)
                    .with_job(&job_id),
                PrinterEvent::new(&printer_id, PrinterEventType::JobUpdated)
                    .with_file(file)
                    .with_job(&job_id),
                PrinterEvent::new(&printer_id, PrinterEventType::JobCompleted),
            ];
            for event in events {
                if tx.send(event).await.is_err() {
                    debug!("event consumer gone, printers stop");
                    return;
                }
            }
        }
        tokio::time::sleep(pace).await;
    }
}

mod sim;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use spool_core::{PipelineBuilder, PipelineConfig, Priority};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::sim::{SimDownloader, SimThumbnailer};

/// Run the download/thumbnail pipeline against simulated printers.
#[derive(Parser, Debug)]
struct Args {
    /// TOML config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 2)]
    printers: usize,

    /// Jobs each printer runs.
    #[arg(long, default_value_t = 3)]
    jobs: usize,

    /// Stop after this many seconds (or on Ctrl-C).
    #[arg(long, default_value_t = 30)]
    run_secs: u64,

    /// Simulated latency of every remote call, in milliseconds.
    #[arg(long, default_value_t = 300)]
    latency_ms: u64,

    /// Ignore printer events and queue these files manually on printer-1.
    #[arg(long = "manual", value_name = "FILE")]
    manual: Vec<String>,

    #[arg(long, default_value = "normal")]
    priority: Priority,

    /// Print every pipeline event as a JSON line.
    #[arg(long)]
    events: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if !args.manual.is_empty() {
        config.auto_detection = false;
    }

    let latency = Duration::from_millis(args.latency_ms);
    let manager = PipelineBuilder::new(config)
        .download_executor(Arc::new(SimDownloader::new(latency)))
        .thumbnail_executor(Arc::new(SimThumbnailer::new(latency)))
        .build()
        .context("building pipeline")?;

    if args.events {
        let mut rx = manager.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => println!("{line}"),
                        Err(err) => warn!(error = %err, "event not serializable"),
                    },
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "event printer lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    manager.start();

    for file in &args.manual {
        let id = manager
            .request_download("printer-1", file, args.priority)
            .with_context(|| format!("queueing {file}"))?;
        info!(task_id = %id, file, "manual download requested");
    }

    let (tx, rx) = mpsc::channel(64);
    manager.spawn_event_source(rx);
    tokio::spawn(sim::run_printers(args.printers, args.jobs, latency * 4, tx));

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.run_secs)) => {
            info!("run time elapsed");
        }
        res = tokio::signal::ctrl_c() => {
            res.context("waiting for ctrl-c")?;
            info!("interrupted");
        }
    }

    let drained = manager.shutdown(Duration::from_secs(10)).await;
    if !drained {
        warn!("some tasks were still running at exit");
    }

    let stats = manager.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

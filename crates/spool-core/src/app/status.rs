//! Periodic stats publishing.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::manager::ManagerInner;
use crate::domain::DomainEvent;
use crate::ports::EventSink;

/// Publish a `StatsSnapshot` every `every` until shutdown.
pub(super) async fn stats_loop(
    manager: Weak<ManagerInner>,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let stats = manager.stats();
                debug!(
                    downloads_outstanding = stats.downloads.outstanding(),
                    thumbnails_outstanding = stats.thumbnails.outstanding(),
                    printers = stats.monitored_printer_count,
                    "pipeline stats"
                );
                manager.bus().emit(DomainEvent::StatsSnapshot(stats));
            }
        }
    }
}

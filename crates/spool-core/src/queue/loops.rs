//! Background loops owned by a queue.
//!
//! Loops hold a `Weak` handle so a dropped queue ends them, and stop on the
//! queue's shutdown signal.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::TaskProcessor;
use super::memory::{QueueInner, TaskQueue};

/// Run `action` every `every` until shutdown or until the queue is dropped.
pub(super) async fn run_every<P: TaskProcessor>(
    queue: Weak<QueueInner<P>>,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    name: &'static str,
    action: fn(&TaskQueue<P>) -> usize,
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
                let Some(queue) = TaskQueue::upgrade(&queue) else {
                    break;
                };
                let n = action(&queue);
                trace!(loop_name = name, kind = %queue.kind(), n, "tick");
            }
        }
    }

    debug!(loop_name = name, "queue loop stopped");
}

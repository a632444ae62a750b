use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::DomainEvent;
use crate::ports::{Clock, EventSink, SystemClock};

/// A domain event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: DomainEvent,
}

pub type EventReceiver = broadcast::Receiver<PipelineEvent>;

/// Event bus for distributing pipeline events.
///
/// Subscribers that fall more than `capacity` events behind get
/// `RecvError::Lagged` and continue from the oldest retained event.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
    sequence: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(1)),
            clock,
        }
    }

    /// Publish an event (returns sequence number).
    ///
    /// Fails only when nobody is subscribed; the sequence number is used up
    /// either way.
    pub fn publish(&self, event: DomainEvent) -> Result<u64, String> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let event = PipelineEvent {
            sequence,
            timestamp: self.clock.now(),
            event,
        };

        self.sender
            .send(event)
            .map(|_| sequence)
            .map_err(|e| format!("failed to publish event: {e}"))
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Sequence number the next event will get.
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("sequence", &self.current_sequence())
            .field("receivers", &self.receiver_count())
            .finish()
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: DomainEvent) {
        let event_type = event.event_type();
        if let Err(err) = self.publish(event) {
            trace!(event_type, error = %err, "event dropped");
        }
    }
}

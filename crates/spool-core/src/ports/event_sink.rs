//! EventSink port - where domain events go.
//!
//! Observers (UI, logging, the CLI) subscribe on the other side; they never
//! get a handle back into queue state.

use crate::domain::DomainEvent;

pub trait EventSink: Send + Sync {
    /// Publish one event. Must not block and must not fail the caller.
    fn emit(&self, event: DomainEvent);
}

//! Impls - implementations of the ports that ship with the crate.
//!
//! - **EventBus**: broadcast fan-out of domain events to any number of observers
//! - **NoopEventSink**: drops everything, for tests and headless runs

pub mod event_bus;
pub mod noop;

pub use self::event_bus::{EventBus, EventReceiver, PipelineEvent};
pub use self::noop::NoopEventSink;

//! spool-core
//!
//! Processing core of a 3D-printer dashboard: fetches the file a printer is
//! working on and produces a thumbnail for it, through two priority task
//! queues driven by an orchestration manager.
//!
//! # Modules
//! - **domain**: task model, status, errors, events, stats, printer events
//! - **ports**: seams to the outside (clock, ids, event sink, executors)
//! - **queue**: the generic priority task queue engine
//! - **processors**: download and thumbnail processors
//! - **impls**: event bus and no-op sink
//! - **app**: builder, manager, printer tracking, chaining hooks
//! - **config**: TOML configuration

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod processors;
pub mod queue;

pub use app::{BuildError, PipelineBuilder, PipelineManager, PrinterPhase};
pub use config::{ConfigError, PipelineConfig, QueueConfig};
pub use domain::{
    DomainEvent, EnqueueError, PipelineStats, Priority, PrinterEvent, PrinterEventType, TaskError,
    TaskId, TaskStatus,
};
pub use impls::{EventBus, PipelineEvent};
pub use queue::{TaskProcessor, TaskQueue};

//! App - the orchestration layer.
//!
//! Combines the queues, processors and ports into a running pipeline.
//!
//! # Main components
//! - **PipelineBuilder**: wiring and startup validation
//! - **PipelineManager**: printer events, operator actions, stats
//! - **PrinterRegistry**: per-printer pipeline phase
//! - **Hooks**: download -> thumbnail chaining, thumbnail-ready events

pub mod builder;
pub mod hooks;
pub mod manager;
pub mod printers;
mod status;

pub use self::builder::{BuildError, PipelineBuilder};
pub use self::hooks::{ChainThumbnailHook, ThumbnailReadyHook};
pub use self::manager::PipelineManager;
pub use self::printers::{PrinterPhase, PrinterRegistry, PrinterTracking};

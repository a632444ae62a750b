//! Domain model: ids, the task model, status, errors, events, stats and
//! printer notifications.

pub mod errors;
pub mod events;
pub mod ids;
pub mod printer;
pub mod state;
pub mod stats;
pub mod task;

pub use errors::{EnqueueError, ErrorKind, TaskError, ValidationError};
pub use events::{DomainEvent, TaskLifecycleEvent, ThumbnailReadyEvent};
pub use ids::TaskId;
pub use printer::{PrinterEvent, PrinterEventType};
pub use state::TaskStatus;
pub use stats::{PipelineStats, QueueStatsSnapshot};
pub use task::{Priority, QueueTask, TaskKind, combined_key};

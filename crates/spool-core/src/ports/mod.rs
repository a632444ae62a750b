//! Ports - seams to the outside world.
//!
//! Each trait here is implemented by something the pipeline does not own:
//! time, id generation, event delivery and the remote API that does the
//! actual downloading and thumbnail work.

pub mod clock;
pub mod download;
pub mod event_sink;
pub mod id_generator;
pub mod thumbnail;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::download::{DownloadExecutor, DownloadedFile};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::thumbnail::{ThumbnailExecutor, ThumbnailOutput};

//! Processors - the kind-specific halves of the two queues.

pub mod download;
pub mod thumbnail;

pub use self::download::{DownloadProcessor, DownloadTask};
pub use self::thumbnail::{ThumbnailArtifact, ThumbnailMethod, ThumbnailProcessor, ThumbnailTask};

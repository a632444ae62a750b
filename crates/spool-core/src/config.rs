//! Pipeline configuration.
//!
//! Everything is supplied at construction. Files are TOML with durations in
//! seconds; every field has a default, so an empty file is a valid config.
//!
//! ```toml
//! auto_detection = true
//! stats_interval = 30
//!
//! [downloads]
//! concurrency = 1
//! max_attempts = 2
//! retry_delay = 10
//!
//! [thumbnails]
//! execution_timeout = 120
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::queue::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for one task queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of tasks processed at once.
    pub concurrency: usize,

    /// Attempts before a transiently failing task is marked failed.
    pub max_attempts: u32,

    #[serde(with = "secs")]
    pub retry_delay: Duration,

    /// 1.0 keeps the retry delay fixed.
    pub retry_multiplier: f64,

    /// How long finished tasks stay in the histories.
    #[serde(with = "secs")]
    pub retention: Duration,

    #[serde(with = "secs")]
    pub tick_interval: Duration,

    #[serde(with = "secs")]
    pub sweep_interval: Duration,

    /// Size of the recent completed/failed slices in `contents()`.
    pub recent_limit: usize,

    /// Per-attempt execution limit. `None` lets a call run indefinitely.
    #[serde(with = "opt_secs")]
    pub execution_timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_attempts: 2,
            retry_delay: Duration::from_secs(10),
            retry_multiplier: 1.0,
            retention: Duration::from_secs(24 * 60 * 60),
            tick_interval: Duration::from_secs(2),
            sweep_interval: Duration::from_secs(5 * 60),
            recent_limit: 10,
            execution_timeout: None,
        }
    }
}

impl QueueConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.retry_delay, self.retry_multiplier)
    }

    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(format!("{name}: {msg}")));

        if self.concurrency == 0 {
            return invalid("concurrency must be at least 1");
        }
        if self.max_attempts == 0 {
            return invalid("max_attempts must be at least 1");
        }
        if !self.retry_multiplier.is_finite() || self.retry_multiplier < 1.0 {
            return invalid("retry_multiplier must be a finite number >= 1.0");
        }
        if self.tick_interval.is_zero() {
            return invalid("tick_interval must be greater than zero");
        }
        if self.sweep_interval.is_zero() {
            return invalid("sweep_interval must be greater than zero");
        }
        if self.execution_timeout.is_some_and(|t| t.is_zero()) {
            return invalid("execution_timeout must be greater than zero");
        }
        Ok(())
    }
}

/// Settings for the whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub downloads: QueueConfig,
    pub thumbnails: QueueConfig,

    /// React to printer/job notifications at startup.
    pub auto_detection: bool,

    /// Buffered events per subscriber before slow subscribers start lagging.
    pub event_capacity: usize,

    /// How often a stats snapshot is published.
    #[serde(with = "secs")]
    pub stats_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            downloads: QueueConfig::default(),
            thumbnails: QueueConfig::default(),
            auto_detection: true,
            event_capacity: 256,
            stats_interval: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: PipelineConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&s)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.downloads.validate("downloads")?;
        self.thumbnails.validate("thumbnails")?;
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        if self.stats_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "stats_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Durations as (fractional) seconds.
mod secs {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}

mod opt_secs {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(de::Error::custom))
            .transpose()
    }
}

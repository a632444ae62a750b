//! Task model shared by every queue.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::TaskId;

/// Which queue a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Download,
    Thumbnail,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Download => "download",
            TaskKind::Thumbnail => "thumbnail",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority. Lower ordinal = more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub fn ordinal(self) -> u32 {
        match self {
            Priority::Urgent => 1,
            Priority::High => 2,
            Priority::Normal => 3,
            Priority::Low => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "urgent" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Combined priority key used to order pending tasks.
///
/// `type_weight * 10 + priority ordinal`: the type weight dominates, the task
/// priority only breaks ties inside one weight class.
pub fn combined_key(type_weight: u32, priority: Priority) -> u32 {
    type_weight * 10 + priority.ordinal()
}

/// A unit of work a queue can hold.
///
/// # Trait Bounds
/// - `Serialize + DeserializeOwned`: tasks show up in events and snapshots.
/// - `Clone + Send + Sync + 'static`: tasks are handed to spawned executions.
pub trait QueueTask: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: TaskKind;

    fn id(&self) -> &TaskId;

    fn priority(&self) -> Priority;
}

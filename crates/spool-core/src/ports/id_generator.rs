//! IdGenerator port - ids for operator-initiated tasks.
//!
//! Automatic tasks get ids derived from printer/file identity so that repeated
//! notifications collapse onto one task. Manual requests must never collapse,
//! so they get a ULID.

use crate::domain::TaskId;
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    /// Generate a fresh task id of the form `{prefix}-{ulid}`.
    fn generate_task_id(&self, prefix: &str) -> TaskId;
}

/// ULID based generator.
///
/// The timestamp part comes from the injected clock, so a `FixedClock`
/// yields ids with identical timestamps (the random part still differs).
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self, prefix: &str) -> TaskId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        TaskId::new(format!("{prefix}-{}", ulid.to_string().to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_task_id("manual");
        let id2 = id_gen.generate_task_id("manual");

        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("manual-"));
    }

    #[test]
    fn ulid_generator_with_fixed_clock_shares_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.generate_task_id("manual");
        let id2 = id_gen.generate_task_id("manual");
        assert_ne!(id1, id2);

        let ts = |id: &TaskId| {
            let raw = id.as_str().trim_start_matches("manual-").to_uppercase();
            Ulid::from_string(&raw).unwrap().timestamp_ms()
        };
        assert_eq!(ts(&id1), ts(&id2));
        assert_eq!(ts(&id1), fixed_time.timestamp_millis() as u64);
    }
}

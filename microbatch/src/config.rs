// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BatcherError;

/// How many processor invocations may run at the same time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Concurrency {
    #[default]
    /// One thread per job, no limit
    Unbounded,
    /// A fixed pool of worker threads
    Bounded(usize),
}

/// Settings of a [`crate::Batcher`]. Fixed once the batcher is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatcherConfig {
    /// Maximum time a job waits in the queue before it is flushed.
    #[serde(rename = "frequency_ms", with = "duration_ms")]
    pub frequency: Duration,
    /// Queue length that triggers an immediate flush.
    pub batch_size: usize,
    pub concurrency: Concurrency,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            frequency: Duration::from_secs(1),
            batch_size: 10,
            concurrency: Concurrency::Unbounded,
        }
    }
}

impl BatcherConfig {
    pub fn validate(&self) -> Result<(), BatcherError> {
        if self.batch_size == 0 {
            return Err(BatcherError::InvalidConfig(
                "batch_size must be at least 1".into(),
            ));
        }
        if self.frequency.is_zero() {
            return Err(BatcherError::InvalidConfig(
                "frequency must be longer than zero".into(),
            ));
        }
        if self.concurrency == Concurrency::Bounded(0) {
            return Err(BatcherError::InvalidConfig(
                "a bounded pool needs at least one worker".into(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        // rounded up so a nonzero duration never comes back as zero
        let millis = value.as_nanos().div_ceil(1_000_000);
        serializer.serialize_u64(millis.try_into().unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

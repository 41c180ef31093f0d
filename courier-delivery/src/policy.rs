//! The tiered retry schedule for transient failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry schedule for transiently-failed deliveries.
///
/// The delay is chosen by the cumulative transient-failure count for the
/// current message: one quick retry, a couple on the half hour, then a
/// slow tail every few hours until the schedule gives up. The defaults
/// spread roughly 48 hours of retrying across 19 delays, approximating
/// conventional mail-relay behavior without implementing any one
/// standard verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry, in seconds.
    #[serde(default = "defaults::first_retry_secs")]
    pub first_retry_secs: u64,

    /// Delay for retries two through `early_tries`, in seconds.
    #[serde(default = "defaults::early_retry_secs")]
    pub early_retry_secs: u64,

    /// The last try still on the early schedule.
    #[serde(default = "defaults::early_tries")]
    pub early_tries: u32,

    /// Delay for every later retry, in seconds.
    #[serde(default = "defaults::late_retry_secs")]
    pub late_retry_secs: u64,

    /// Total tries after which the message is dropped.
    #[serde(default = "defaults::max_tries")]
    pub max_tries: u32,
}

impl RetryPolicy {
    /// The delay before retrying after the `tries`th transient failure
    /// (1-indexed), or `None` once the schedule has given up.
    #[must_use]
    pub const fn backoff(&self, tries: u32) -> Option<Duration> {
        if tries >= self.max_tries {
            None
        } else if tries <= 1 {
            Some(Duration::from_secs(self.first_retry_secs))
        } else if tries <= self.early_tries {
            Some(Duration::from_secs(self.early_retry_secs))
        } else {
            Some(Duration::from_secs(self.late_retry_secs))
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            first_retry_secs: defaults::first_retry_secs(),
            early_retry_secs: defaults::early_retry_secs(),
            early_tries: defaults::early_tries(),
            late_retry_secs: defaults::late_retry_secs(),
            max_tries: defaults::max_tries(),
        }
    }
}

mod defaults {
    pub const fn first_retry_secs() -> u64 {
        60 // 1 minute
    }

    pub const fn early_retry_secs() -> u64 {
        1800 // 30 minutes
    }

    pub const fn early_tries() -> u32 {
        3
    }

    pub const fn late_retry_secs() -> u64 {
        10800 // 3 hours
    }

    pub const fn max_tries() -> u32 {
        20
    }
}

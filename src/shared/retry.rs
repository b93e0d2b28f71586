use std::time::Duration;

use clap::Args;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;

#[derive(Debug, Args, Getters, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryArgs {
    ///Number of extra attempts made for an image after its first request fails.
    #[arg(short = 'r', long, default_value_t = DEFAULT_RETRY_ATTEMPTS, env = "GALLERY_FETCH_RETRY_ATTEMPTS")]
    pub retry_attempts: u32,
    ///Base delay in milliseconds before the first retry, doubled for every retry after it.
    #[arg(short = 'd', long, default_value_t = DEFAULT_RETRY_BASE_DELAY_MS, env = "GALLERY_FETCH_RETRY_DELAY_MS")]
    pub retry_base_delay_ms: u64,
}

impl RetryArgs {
    pub fn new(retry_attempts: u32, retry_base_delay_ms: u64) -> Self {
        Self { retry_attempts, retry_base_delay_ms }
    }

    /// Wait before retry number `attempt + 1`, i.e. `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        backoff_delay(self.retry_base_delay_ms, attempt)
    }
}

impl Default for RetryArgs {
    fn default() -> Self {
        Self {
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }
}

/// Exponential backoff, `attempt` is 0-based.
pub fn backoff_delay(base_delay_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
    Duration::from_millis(base_delay_ms.saturating_mul(factor))
}

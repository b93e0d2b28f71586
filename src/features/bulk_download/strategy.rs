//! Maps job size and connection speed to a concurrency strategy.
//!
//! Small jobs gain nothing from parallel requests, mid-size jobs use a few
//! connections at once, and large jobs are chunked so that the number of fully
//! buffered responses held in memory stays bounded.

use crate::features::bulk_download::models::{JobConfig, SpeedClass, Strategy};
use crate::shared::retry::RetryArgs;

const SEQUENTIAL_MAX: usize = 3;
const PARALLEL_MAX: usize = 10;
const MEDIUM_CHUNKED_MAX: usize = 25;

/// Pick the strategy for `item_count` items with the default retry policy.
pub fn select_strategy(item_count: usize, speed: SpeedClass) -> JobConfig {
    select_strategy_with(item_count, speed, RetryArgs::default())
}

pub fn select_strategy_with(item_count: usize, speed: SpeedClass, retry: RetryArgs) -> JobConfig {
    let (strategy, max_concurrent, chunk_size) = match item_count {
        0..=SEQUENTIAL_MAX => (Strategy::Sequential, 1, 1),
        n if n <= PARALLEL_MAX => {
            let max_concurrent = match speed {
                SpeedClass::Fast => 3,
                SpeedClass::Medium => 2,
                SpeedClass::Slow => 1,
            };
            // A parallel job is one chunk, batches are the unit of concurrency.
            (Strategy::Parallel, max_concurrent, max_concurrent)
        }
        n if n <= MEDIUM_CHUNKED_MAX => {
            let max_concurrent = match speed {
                SpeedClass::Fast => 4,
                SpeedClass::Medium => 3,
                SpeedClass::Slow => 2,
            };
            (Strategy::Chunked, max_concurrent, 8)
        }
        _ => {
            let max_concurrent = if speed == SpeedClass::Fast { 3 } else { 2 };
            (Strategy::Chunked, max_concurrent, 10)
        }
    };

    JobConfig {
        strategy,
        max_concurrent,
        chunk_size,
        retry_attempts: retry.retry_attempts,
        retry_base_delay_ms: retry.retry_base_delay_ms,
    }
}

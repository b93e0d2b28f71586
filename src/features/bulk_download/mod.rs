//! # Bulk download
//!
//! Downloads a gallery's worth of images on request. A single connection
//! probe picks the concurrency strategy, every item runs through the task
//! executor with retry and timeout, and the scheduler owns the job state.

pub mod aggregator;
#[cfg(feature = "local")]
pub mod cli;
pub mod executor;
#[cfg(feature = "local")]
pub mod handler;
pub mod manifest;
pub mod models;
pub mod observer;
pub mod probe;
pub mod scheduler;
pub mod strategy;

#[cfg(test)]
pub(crate) mod test_support;

pub use models::{
    DownloadItem, DownloadTaskState, JobConfig, JobResult, JobState, JobSummary, SpeedClass,
    Strategy, TaskStatus,
};
pub use scheduler::{JobPhase, Scheduler, SchedulerBuilder};

//! # gallery-fetch
//!
//! Adaptive bulk downloader for photo-delivery galleries. Given a list of
//! image URLs it probes the connection once, picks a sequential, parallel or
//! chunked plan, downloads every image with retry and timeouts, and hands
//! each finished image to an artifact sink.

pub mod features;
pub mod shared;
pub mod utils;

pub use features::bulk_download::{
    DownloadItem, JobResult, JobSummary, Scheduler, SchedulerBuilder, SpeedClass,
};
pub use shared::errors::FetchError;

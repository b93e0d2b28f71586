use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use clap::ValueEnum;
use derive_getters::Getters;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

/// # ``DownloadItem``
/// One remote image requested as part of a bulk job.
/// * id : caller supplied identifier, unique within a job.
/// * ``source_url`` : where the image is fetched from.
/// * ``destination_name`` : name handed to the artifact sink.
/// * ``expected_size_bytes`` : optional size hint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct DownloadItem {
    id: String,
    source_url: Url,
    destination_name: String,
    expected_size_bytes: Option<u64>,
}

impl DownloadItem {
    pub fn new(id: impl Into<String>, source_url: Url, destination_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_url,
            destination_name: destination_name.into(),
            expected_size_bytes: None,
        }
    }

    pub fn with_expected_size(mut self, size: u64) -> Self {
        self.expected_size_bytes = Some(size);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Downloading,
    Retrying,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }
}

/// Per-item progress, written only by the executor running that item.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DownloadTaskState {
    pub item_id: String,
    pub progress_percent: u8,
    pub status: TaskStatus,
    pub attempt_count: u32,
    pub started_at: Option<DateTime<Local>>,
    pub ended_at: Option<DateTime<Local>>,
    pub last_error: Option<String>,
}

impl DownloadTaskState {
    pub fn pending(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            progress_percent: 0,
            status: TaskStatus::Pending,
            attempt_count: 0,
            started_at: None,
            ended_at: None,
            last_error: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SpeedClass {
    Slow,
    Medium,
    Fast,
}

impl SpeedClass {
    /// Deadline for one request attempt, head and body included.
    pub fn request_timeout(self) -> Duration {
        match self {
            SpeedClass::Slow => Duration::from_secs(30),
            SpeedClass::Medium => Duration::from_secs(20),
            SpeedClass::Fast => Duration::from_secs(10),
        }
    }

    pub fn batch_pause(self) -> Duration {
        match self {
            SpeedClass::Slow => Duration::from_millis(2000),
            SpeedClass::Medium => Duration::from_millis(1000),
            SpeedClass::Fast => Duration::from_millis(500),
        }
    }

    pub fn chunk_pause(self) -> Duration {
        match self {
            SpeedClass::Slow => Duration::from_millis(3000),
            SpeedClass::Medium => Duration::from_millis(2000),
            SpeedClass::Fast => Duration::from_millis(1000),
        }
    }
}

impl fmt::Display for SpeedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpeedClass::Slow => "slow",
            SpeedClass::Medium => "medium",
            SpeedClass::Fast => "fast",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Sequential,
    Parallel,
    Chunked,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Sequential => "sequential",
            Strategy::Parallel => "parallel",
            Strategy::Chunked => "chunked",
        };
        f.write_str(name)
    }
}

/// Strategy and limits fixed for the lifetime of one job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub strategy: Strategy,
    pub max_concurrent: usize,
    pub chunk_size: usize,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl JobConfig {
    pub fn describe(&self) -> String {
        match self.strategy {
            Strategy::Sequential => "sequential".to_string(),
            Strategy::Parallel => format!("parallel (up to {} at once)", self.max_concurrent),
            Strategy::Chunked => format!(
                "chunked ({} per chunk, up to {} at once)",
                self.chunk_size, self.max_concurrent
            ),
        }
    }
}

/// Live state of the active (or most recent) job.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobState {
    pub is_running: bool,
    pub total_items: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub overall_progress_percent: f64,
    pub strategy: Strategy,
    pub speed: SpeedClass,
    pub started_at: DateTime<Local>,
    pub ended_at: Option<DateTime<Local>>,
    pub tasks: IndexMap<String, DownloadTaskState>,
}

impl JobState {
    pub fn new(items: &[DownloadItem], config: &JobConfig, speed: SpeedClass) -> Self {
        let tasks = items
            .iter()
            .map(|item| (item.id().clone(), DownloadTaskState::pending(item.id().clone())))
            .collect();
        Self {
            is_running: true,
            total_items: items.len(),
            completed_count: 0,
            failed_count: 0,
            overall_progress_percent: 0.0,
            strategy: config.strategy,
            speed,
            started_at: Local::now(),
            ended_at: None,
            tasks,
        }
    }

    /// Replace one task's state and refresh the terminal counters.
    pub fn apply(&mut self, task: DownloadTaskState) {
        if let Some(slot) = self.tasks.get_mut(&task.item_id) {
            *slot = task;
        }
        self.completed_count = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        self.failed_count = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Error)
            .count();
        self.overall_progress_percent = if self.total_items == 0 {
            0.0
        } else {
            (self.completed_count + self.failed_count) as f64 / self.total_items as f64 * 100.0
        };
    }
}

/// Point-in-time aggregate over a job's tasks.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub overall_progress_percent: f64,
    pub is_active: bool,
}

/// Outcome of one job, produced once when it completes or is cancelled.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobResult {
    pub succeeded: bool,
    pub cancelled: bool,
    pub total_requested: usize,
    pub total_completed: usize,
    pub total_failed: usize,
    pub duration_ms: u64,
    pub errors: Vec<String>,
    pub completed_names: Vec<String>,
}

//! Summaries and final results derived from job state.
//!
//! Only terminal tasks count toward the aggregate percentage, the 10/50/80
//! steps of in-flight tasks are visible per task but not folded in here.

use std::time::Duration;

use serde::Serialize;

use crate::features::bulk_download::models::{
    DownloadItem, JobConfig, JobResult, JobState, JobSummary, SpeedClass, TaskStatus,
};

pub fn summarize(state: Option<&JobState>) -> JobSummary {
    let Some(state) = state else {
        return JobSummary {
            total: 0,
            completed: 0,
            failed: 0,
            in_progress: 0,
            overall_progress_percent: 0.0,
            is_active: false,
        };
    };
    let total = state.total_items;
    let completed = state.completed_count;
    let failed = state.failed_count;
    let overall_progress_percent = if total == 0 {
        0.0
    } else {
        (completed + failed) as f64 / total as f64 * 100.0
    };
    JobSummary {
        total,
        completed,
        failed,
        in_progress: total.saturating_sub(completed + failed),
        overall_progress_percent,
        is_active: state.is_running,
    }
}

/// Build the immutable result of a finished job, lists in input order.
pub fn finalize(
    state: &JobState,
    items: &[DownloadItem],
    cancelled: bool,
    duration: Duration,
) -> JobResult {
    let mut errors = Vec::new();
    let mut completed_names = Vec::new();
    for item in items {
        let Some(task) = state.tasks.get(item.id()) else {
            continue;
        };
        match task.status {
            TaskStatus::Completed => completed_names.push(item.destination_name().clone()),
            TaskStatus::Error => {
                let message = task.last_error.as_deref().unwrap_or("unknown error");
                errors.push(format!("{}: {message}", item.destination_name()));
            }
            _ => {}
        }
    }

    JobResult {
        succeeded: state.failed_count == 0 && !cancelled,
        cancelled,
        total_requested: state.total_items,
        total_completed: state.completed_count,
        total_failed: state.failed_count,
        duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        errors,
        completed_names,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StatusKind {
    Started,
    FullSuccess,
    PartialSuccess,
    TotalFailure,
    Cancelled,
}

/// Informational message for the user, never authoritative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
}

pub fn start_message(item_count: usize, config: &JobConfig, speed: SpeedClass) -> StatusMessage {
    StatusMessage {
        kind: StatusKind::Started,
        text: format!(
            "Downloading {item_count} image{} using {} strategy ({speed} connection)",
            plural(item_count),
            config.describe()
        ),
    }
}

pub fn final_message(result: &JobResult) -> StatusMessage {
    let (kind, text) = if result.cancelled {
        (
            StatusKind::Cancelled,
            format!(
                "Download cancelled, {} of {} image{} saved",
                result.total_completed,
                result.total_requested,
                plural(result.total_requested)
            ),
        )
    } else if result.total_failed == 0 {
        (
            StatusKind::FullSuccess,
            format!(
                "All {} image{} downloaded",
                result.total_completed,
                plural(result.total_completed)
            ),
        )
    } else if result.total_completed > 0 {
        (
            StatusKind::PartialSuccess,
            format!(
                "{} of {} image{} downloaded, {} failed",
                result.total_completed,
                result.total_requested,
                plural(result.total_requested),
                result.total_failed
            ),
        )
    } else {
        (
            StatusKind::TotalFailure,
            format!(
                "Download failed, none of {} image{} could be saved",
                result.total_requested,
                plural(result.total_requested)
            ),
        )
    };
    StatusMessage { kind, text }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

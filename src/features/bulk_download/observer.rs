use tracing::{debug, info, warn};

use crate::features::bulk_download::aggregator::{StatusKind, StatusMessage};
use crate::features::bulk_download::models::DownloadTaskState;

/// Notification hooks for a bulk job that any UI/interface can implement.
///
/// Hooks are fire-and-forget and are called from the scheduler's tasks, so
/// implementations must be cheap and must not block.
pub trait JobObserver: Send + Sync {
    /// A job was accepted, with the ids of every item in input order.
    fn on_start(&self, _item_ids: &[String]) {}

    /// A task changed state.
    fn on_progress(&self, _task: &DownloadTaskState) {}

    /// The job ran to its natural end, with every task's final state.
    fn on_complete(&self, _tasks: &[DownloadTaskState]) {}

    /// A task ended in error.
    fn on_error(&self, _message: &str, _item_id: Option<&str>) {}

    /// Cancellation was requested for the running job.
    fn on_cancel(&self) {}

    /// User facing status line, one at start and one at the end of a job.
    fn on_status(&self, _message: &StatusMessage) {}
}

/// No-op observer for when nobody is listening.
pub struct NoOpObserver;

impl JobObserver for NoOpObserver {}

/// Observer that only emits tracing events.
pub struct TracingObserver;

impl JobObserver for TracingObserver {
    fn on_start(&self, item_ids: &[String]) {
        info!(items = item_ids.len(), "Bulk download started");
    }

    fn on_progress(&self, task: &DownloadTaskState) {
        debug!(
            item_id = %task.item_id,
            status = ?task.status,
            progress = task.progress_percent,
            attempt = task.attempt_count,
            "Task progress"
        );
    }

    fn on_error(&self, message: &str, item_id: Option<&str>) {
        warn!(item_id, "Task failed: {message}");
    }

    fn on_cancel(&self) {
        info!("Bulk download cancellation requested");
    }

    fn on_status(&self, message: &StatusMessage) {
        match message.kind {
            StatusKind::TotalFailure => warn!("{}", message.text),
            _ => info!("{}", message.text),
        }
    }
}

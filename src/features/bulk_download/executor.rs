//! Runs a single item to a terminal state.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Local;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::features::bulk_download::models::{
    DownloadItem, DownloadTaskState, JobConfig, JobState, SpeedClass, TaskStatus,
};
use crate::features::bulk_download::observer::JobObserver;
use crate::shared::{
    errors::FetchError,
    fs::ArtifactSink,
    network::DataTransport,
    retry::backoff_delay,
};

const PROGRESS_STARTED: u8 = 10;
const PROGRESS_HEADERS: u8 = 50;
const PROGRESS_BODY: u8 = 80;
const PROGRESS_DELIVERED: u8 = 100;

/// Publishes task transitions into the shared job state and to the observer.
#[derive(Clone)]
pub struct TaskReporter {
    state_tx: watch::Sender<Option<JobState>>,
    observer: Arc<dyn JobObserver>,
}

impl TaskReporter {
    pub fn new(state_tx: watch::Sender<Option<JobState>>, observer: Arc<dyn JobObserver>) -> Self {
        Self { state_tx, observer }
    }

    fn publish(&self, task: &DownloadTaskState) {
        self.state_tx.send_modify(|state| {
            if let Some(state) = state {
                state.apply(task.clone());
            }
        });
        self.observer.on_progress(task);
    }

    /// Current state of one task in the shared job state.
    fn current(&self, item_id: &str) -> Option<DownloadTaskState> {
        self.state_tx
            .borrow()
            .as_ref()
            .and_then(|state| state.tasks.get(item_id).cloned())
    }

    fn fail(&self, task: &DownloadTaskState) {
        self.publish(task);
        let message = task.last_error.as_deref().unwrap_or_default();
        self.observer.on_error(message, Some(&task.item_id));
    }
}

/// Downloads one item with a speed-derived timeout and exponential-backoff retry.
pub struct TaskExecutor {
    transport: Arc<dyn DataTransport>,
    sink: Arc<dyn ArtifactSink>,
    reporter: TaskReporter,
    retry_attempts: u32,
    retry_base_delay_ms: u64,
    request_timeout: Duration,
}

impl TaskExecutor {
    pub fn new(
        transport: Arc<dyn DataTransport>,
        sink: Arc<dyn ArtifactSink>,
        reporter: TaskReporter,
        config: &JobConfig,
        speed: SpeedClass,
    ) -> Self {
        Self {
            transport,
            sink,
            reporter,
            retry_attempts: config.retry_attempts,
            retry_base_delay_ms: config.retry_base_delay_ms,
            request_timeout: speed.request_timeout(),
        }
    }

    /// Run `item` until it completes or fails for good.
    ///
    /// If `cancel` is already signaled the item is left pending and nothing is
    /// published. A cancellation observed later ends the task in error with the
    /// cancellation marker, without spending the remaining retries.
    #[instrument(name = "execute_task", skip_all, fields(item_id = %item.id()))]
    pub async fn execute(&self, item: &DownloadItem, cancel: &CancellationToken) -> DownloadTaskState {
        let mut task = DownloadTaskState::pending(item.id().clone());
        if cancel.is_cancelled() {
            debug!("Job cancelled before the task started.");
            return task;
        }
        task.started_at = Some(Local::now());

        let mut attempt: u32 = 0;
        loop {
            task.status = TaskStatus::Downloading;
            task.progress_percent = PROGRESS_STARTED;
            task.attempt_count = attempt + 1;
            self.reporter.publish(&task);

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(FetchError::Cancelled),
                fetched = tokio::time::timeout(self.request_timeout, self.fetch(item, &mut task)) => {
                    fetched.unwrap_or(Err(FetchError::Timeout(self.request_timeout)))
                }
            };

            let err = match outcome {
                // Nothing is delivered once cancellation has been observed.
                Ok(_) if cancel.is_cancelled() => FetchError::Cancelled,
                Ok(bytes) => return self.deliver(item, task, bytes).await,
                Err(err) => err,
            };

            if cancel.is_cancelled() || err == FetchError::Cancelled {
                info!(attempt = task.attempt_count, "Task cancelled.");
                return self.finish_with_error(task, &FetchError::Cancelled);
            }
            if !err.is_transient() || attempt >= self.retry_attempts {
                warn!(attempt = task.attempt_count, error = %err, "Task failed.");
                return self.finish_with_error(task, &err);
            }

            let delay = backoff_delay(self.retry_base_delay_ms, attempt);
            warn!(
                attempt = task.attempt_count,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Attempt failed, retrying."
            );
            task.status = TaskStatus::Retrying;
            task.last_error = Some(err.to_string());
            self.reporter.publish(&task);

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("Task cancelled during backoff.");
                    return self.finish_with_error(task, &FetchError::Cancelled);
                }
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// One GET, head then full body. Progress is published at 50 and 80.
    async fn fetch(&self, item: &DownloadItem, task: &mut DownloadTaskState) -> Result<Bytes, FetchError> {
        let response = self.transport.open(item.source_url()).await?;
        if !response.is_success() {
            return Err(FetchError::HttpStatus(response.status));
        }
        task.progress_percent = PROGRESS_HEADERS;
        self.reporter.publish(task);

        let bytes = response.collect_body().await?;
        if let Some(expected) = item.expected_size_bytes() {
            if *expected != bytes.len() as u64 {
                debug!(expected, received = bytes.len(), "Body size differs from the expected size.");
            }
        }
        task.progress_percent = PROGRESS_BODY;
        self.reporter.publish(task);
        Ok(bytes)
    }

    async fn deliver(&self, item: &DownloadItem, mut task: DownloadTaskState, bytes: Bytes) -> DownloadTaskState {
        let size = bytes.len();
        match self.sink.deliver(bytes, item.destination_name()).await {
            Ok(()) => {
                task.status = TaskStatus::Completed;
                task.progress_percent = PROGRESS_DELIVERED;
                task.last_error = None;
                task.ended_at = Some(Local::now());
                self.reporter.publish(&task);
                info!(size, name = %item.destination_name(), "Task completed.");
                task
            }
            // The bytes arrived, so a sink failure is not worth another request.
            Err(err) => {
                warn!(error = %err, "Artifact delivery failed.");
                self.finish_with_error(task, &err)
            }
        }
    }

    /// Close out tasks whose runner died mid-flight so the job can still finish.
    pub fn abandon_unfinished(&self, items: &[DownloadItem]) {
        for item in items {
            let Some(task) = self.reporter.current(item.id()) else {
                continue;
            };
            if matches!(task.status, TaskStatus::Downloading | TaskStatus::Retrying) {
                self.finish_with_error(task, &FetchError::Fatal("download task aborted".into()));
            }
        }
    }

    fn finish_with_error(&self, mut task: DownloadTaskState, err: &FetchError) -> DownloadTaskState {
        task.status = TaskStatus::Error;
        task.last_error = Some(err.to_string());
        task.ended_at = Some(Local::now());
        self.reporter.fail(&task);
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::bulk_download::strategy::select_strategy;
    use crate::features::bulk_download::test_support::{
        Event, FakeTransport, FlakySink, RecordingObserver, Reply, items, url_for,
    };
    use crate::shared::errors::CANCELLED_MARKER;

    struct Harness {
        transport: Arc<FakeTransport>,
        sink: Arc<FlakySink>,
        observer: Arc<RecordingObserver>,
        executor: TaskExecutor,
        state_rx: watch::Receiver<Option<JobState>>,
    }

    fn harness_with_sink(speed: SpeedClass, sink: FlakySink) -> Harness {
        let transport = Arc::new(FakeTransport::new());
        let sink = Arc::new(sink);
        let observer = Arc::new(RecordingObserver::new());
        let config = select_strategy(1, speed);
        let (state_tx, state_rx) =
            watch::channel(Some(JobState::new(&items(1), &config, speed)));
        let reporter = TaskReporter::new(state_tx, observer.clone());
        let executor = TaskExecutor::new(transport.clone(), sink.clone(), reporter, &config, speed);
        Harness { transport, sink, observer, executor, state_rx }
    }

    fn harness(speed: SpeedClass) -> Harness {
        harness_with_sink(speed, FlakySink::default())
    }

    #[tokio::test]
    async fn test_success_walks_progress_steps() {
        let h = harness(SpeedClass::Fast);
        let item = &items(1)[0];
        let task = h.executor.execute(item, &CancellationToken::new()).await;

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress_percent, 100);
        assert_eq!(task.attempt_count, 1);
        assert!(task.started_at.is_some() && task.ended_at.is_some());

        let steps: Vec<(TaskStatus, u8)> = h
            .observer
            .progress_of("item-1")
            .iter()
            .map(|t| (t.status, t.progress_percent))
            .collect();
        assert_eq!(
            steps,
            vec![
                (TaskStatus::Downloading, 10),
                (TaskStatus::Downloading, 50),
                (TaskStatus::Downloading, 80),
                (TaskStatus::Completed, 100),
            ]
        );
        assert_eq!(h.sink.delivered(), vec!["IMG_0001.jpg"]);

        let state = h.state_rx.borrow().clone().unwrap();
        assert_eq!(state.completed_count, 1);
        assert_eq!(state.tasks["item-1"].status, TaskStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound_and_backoff() {
        let h = harness(SpeedClass::Fast);
        h.transport.set_reply(&url_for(1), Reply::status(500));
        let item = &items(1)[0];

        let task = h.executor.execute(item, &CancellationToken::new()).await;

        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.attempt_count, 3);
        assert_eq!(task.last_error.as_deref(), Some("Server responded with HTTP 500"));
        assert!(h.sink.delivered().is_empty());

        let requests = h.transport.requests_for(item.source_url());
        assert_eq!(requests.len(), 3);
        let gaps: Vec<Duration> = requests.windows(2).map(|w| w[1].at - w[0].at).collect();
        assert_eq!(gaps, vec![Duration::from_millis(1000), Duration::from_millis(2000)]);

        let statuses: Vec<TaskStatus> =
            h.observer.progress_of("item-1").iter().map(|t| t.status).collect();
        assert_eq!(
            statuses,
            vec![
                TaskStatus::Downloading,
                TaskStatus::Retrying,
                TaskStatus::Downloading,
                TaskStatus::Retrying,
                TaskStatus::Downloading,
                TaskStatus::Error,
            ]
        );
        assert_eq!(
            h.observer.count(|e| matches!(e, Event::Error(_, Some(id)) if id == "item-1")),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let h = harness(SpeedClass::Medium);
        h.transport.set_replies(
            &url_for(1),
            vec![Reply::network_error("connection reset"), Reply::ok()],
        );
        let task = h.executor.execute(&items(1)[0], &CancellationToken::new()).await;

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.attempt_count, 2);
        assert_eq!(task.last_error, None);
        assert_eq!(h.sink.delivered().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_follows_speed_class() {
        let h = harness(SpeedClass::Slow);
        h.transport.set_reply(&url_for(1), Reply::hang());
        let started = tokio::time::Instant::now();

        let task = h.executor.execute(&items(1)[0], &CancellationToken::new()).await;

        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.last_error.as_deref(), Some("Request timed out after 30000ms"));
        // three 30s attempts plus 1s and 2s of backoff
        assert_eq!(started.elapsed(), Duration::from_secs(93));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_in_flight_request() {
        let h = harness(SpeedClass::Fast);
        h.transport.set_reply(&url_for(1), Reply::hang());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let task = h.executor.execute(&items(1)[0], &cancel).await;

        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.last_error.as_deref(), Some(CANCELLED_MARKER));
        assert_eq!(task.attempt_count, 1, "cancellation is never retried");
        assert!(h.sink.delivered().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_skips_remaining_attempts() {
        let h = harness(SpeedClass::Fast);
        h.transport.set_reply(&url_for(1), Reply::status(502));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let task = h.executor.execute(&items(1)[0], &cancel).await;

        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.last_error.as_deref(), Some(CANCELLED_MARKER));
        assert_eq!(h.transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_task_stays_pending() {
        let h = harness(SpeedClass::Fast);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let task = h.executor.execute(&items(1)[0], &cancel).await;

        assert_eq!(task.status, TaskStatus::Pending);
        assert!(h.transport.requests().is_empty());
        assert!(h.observer.events().is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_is_terminal() {
        let h = harness_with_sink(SpeedClass::Fast, FlakySink::rejecting());
        let task = h.executor.execute(&items(1)[0], &CancellationToken::new()).await;

        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.attempt_count, 1);
        assert_eq!(task.last_error.as_deref(), Some("Storage error: disk full"));
        assert_eq!(h.transport.requests().len(), 1);
    }
}

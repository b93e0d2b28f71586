//! Job orchestration: probing, planning, batching and cancellation.
//!
//! The scheduler is an explicit instance, cheap to clone, so one clone can run
//! [`Scheduler::start`] while another reads snapshots or calls
//! [`Scheduler::cancel`]. Job state lives in a `watch` channel and every
//! reader receives an owned copy.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Local;
use derive_setters::Setters;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::features::bulk_download::aggregator::{self, final_message, start_message};
use crate::features::bulk_download::executor::{TaskExecutor, TaskReporter};
use crate::features::bulk_download::models::{
    DownloadItem, DownloadTaskState, JobConfig, JobResult, JobState, JobSummary, SpeedClass,
    Strategy,
};
use crate::features::bulk_download::observer::{JobObserver, NoOpObserver};
use crate::features::bulk_download::probe::{FixedSpeed, SpeedProbe};
use crate::features::bulk_download::strategy::select_strategy_with;
use crate::shared::{
    errors::FetchError, fs::ArtifactSink, network::DataTransport, retry::RetryArgs,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobPhase {
    NotStarted,
    Running,
    Completed,
    Cancelled,
}

struct JobControl {
    phase: JobPhase,
    cancel: Option<CancellationToken>,
}

struct SchedulerInner {
    transport: Arc<dyn DataTransport>,
    sink: Arc<dyn ArtifactSink>,
    probe: Arc<dyn SpeedProbe>,
    observer: Arc<dyn JobObserver>,
    retry: RetryArgs,
    control: Mutex<JobControl>,
    state_tx: watch::Sender<Option<JobState>>,
}

/// Assembles a [`Scheduler`]. The probe defaults to a fixed medium class and the
/// observer to a no-op.
#[derive(Setters)]
#[setters(strip_option)]
pub struct SchedulerBuilder {
    #[setters(skip)]
    transport: Arc<dyn DataTransport>,
    #[setters(skip)]
    sink: Arc<dyn ArtifactSink>,
    ///Connection probe run once at the start of every job.
    probe: Option<Arc<dyn SpeedProbe>>,
    observer: Option<Arc<dyn JobObserver>>,
    retry: RetryArgs,
}

impl SchedulerBuilder {
    pub fn new(transport: Arc<dyn DataTransport>, sink: Arc<dyn ArtifactSink>) -> Self {
        Self { transport, sink, probe: None, observer: None, retry: RetryArgs::default() }
    }
    pub fn build(self) -> Scheduler {
        let (state_tx, _) = watch::channel(None);
        Scheduler {
            inner: Arc::new(SchedulerInner {
                transport: self.transport,
                sink: self.sink,
                probe: self.probe.unwrap_or_else(|| Arc::new(FixedSpeed(SpeedClass::Medium))),
                observer: self.observer.unwrap_or_else(|| Arc::new(NoOpObserver)),
                retry: self.retry,
                control: Mutex::new(JobControl { phase: JobPhase::NotStarted, cancel: None }),
                state_tx,
            }),
        }
    }
}

/// Orchestrates one bulk job at a time.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

/// Marks the job ended if `start` is dropped before it finishes.
struct RunGuard<'a> {
    scheduler: &'a Scheduler,
    token: CancellationToken,
    finished: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.token.cancel();
        self.scheduler.inner.state_tx.send_modify(|state| {
            if let Some(state) = state {
                state.is_running = false;
                state.ended_at = Some(Local::now());
            }
        });
        self.scheduler.control().phase = JobPhase::Cancelled;
    }
}

impl Scheduler {
    pub fn builder(transport: Arc<dyn DataTransport>, sink: Arc<dyn ArtifactSink>) -> SchedulerBuilder {
        SchedulerBuilder::new(transport, sink)
    }

    fn control(&self) -> MutexGuard<'_, JobControl> {
        // The control block holds plain values, a poisoned lock still has a usable phase.
        self.inner
            .control
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Run a bulk job to completion or cancellation.
    ///
    /// Rejected with [`FetchError::Validation`] when `items` is empty, holds
    /// duplicate ids, or another job is running; the current job state is not
    /// touched in that case.
    #[instrument(name = "bulk_job", skip_all, fields(items = items.len()))]
    pub async fn start(&self, items: Vec<DownloadItem>) -> Result<JobResult, FetchError> {
        validate(&items)?;
        let token = {
            let mut control = self.control();
            if control.phase == JobPhase::Running {
                return Err(FetchError::Validation(
                    "a bulk download is already running".into(),
                ));
            }
            let token = CancellationToken::new();
            control.phase = JobPhase::Running;
            control.cancel = Some(token.clone());
            token
        };
        let mut guard = RunGuard { scheduler: self, token: token.clone(), finished: false };

        let clock = Instant::now();
        // Readers see the new job's pending tasks while the probe runs; strategy
        // and speed are provisional until it answers.
        let provisional = select_strategy_with(items.len(), SpeedClass::Medium, self.inner.retry);
        self.inner
            .state_tx
            .send_replace(Some(JobState::new(&items, &provisional, SpeedClass::Medium)));

        let probed = tokio::select! {
            biased;
            () = token.cancelled() => None,
            speed = self.inner.probe.probe() => Some(speed),
        };
        let speed = probed.unwrap_or(SpeedClass::Medium);
        let config = select_strategy_with(items.len(), speed, self.inner.retry);
        self.inner.state_tx.send_modify(|state| {
            if let Some(state) = state {
                state.strategy = config.strategy;
                state.speed = speed;
            }
        });

        if probed.is_none() {
            info!("Cancelled while probing, no item started.");
        } else {
            info!(strategy = %config.strategy, %speed, max_concurrent = config.max_concurrent, chunk_size = config.chunk_size, "Job planned.");
            let ids: Vec<String> = items.iter().map(|item| item.id().clone()).collect();
            self.inner.observer.on_start(&ids);
            self.inner
                .observer
                .on_status(&start_message(items.len(), &config, speed));

            let reporter = TaskReporter::new(self.inner.state_tx.clone(), self.inner.observer.clone());
            let executor = Arc::new(TaskExecutor::new(
                self.inner.transport.clone(),
                self.inner.sink.clone(),
                reporter,
                &config,
                speed,
            ));

            match config.strategy {
                Strategy::Sequential => run_sequential(&executor, &items, &token).await,
                Strategy::Parallel => {
                    run_batches(&executor, &items, &token, config.max_concurrent, speed.batch_pause())
                        .await;
                }
                Strategy::Chunked => run_chunked(&executor, &items, &token, &config, speed).await,
            }
        }

        let cancelled = token.is_cancelled();
        let mut final_state = None;
        self.inner.state_tx.send_modify(|state| {
            if let Some(state) = state {
                state.is_running = false;
                state.ended_at = Some(Local::now());
                final_state = Some(state.clone());
            }
        });
        let final_state = final_state.ok_or_else(|| FetchError::Fatal("job state vanished".into()))?;
        let result = aggregator::finalize(&final_state, &items, cancelled, clock.elapsed());

        {
            let mut control = self.control();
            control.phase = if cancelled { JobPhase::Cancelled } else { JobPhase::Completed };
            control.cancel = None;
        }
        guard.finished = true;

        if !cancelled {
            let tasks: Vec<DownloadTaskState> = final_state.tasks.values().cloned().collect();
            self.inner.observer.on_complete(&tasks);
        }
        self.inner.observer.on_status(&final_message(&result));
        info!(
            completed = result.total_completed,
            failed = result.total_failed,
            cancelled,
            duration_ms = result.duration_ms,
            "Job finished."
        );
        Ok(result)
    }

    /// Request cancellation of the running job. A no-op when nothing runs or
    /// cancellation was already requested.
    pub fn cancel(&self) {
        let control = self.control();
        if control.phase != JobPhase::Running {
            debug!("Cancel ignored, no job running.");
            return;
        }
        let Some(token) = control.cancel.as_ref() else {
            return;
        };
        if token.is_cancelled() {
            return;
        }
        token.cancel();
        drop(control);
        info!("Cancellation requested.");
        self.inner.observer.on_cancel();
    }

    pub fn phase(&self) -> JobPhase {
        self.control().phase
    }

    pub fn is_running(&self) -> bool {
        self.phase() == JobPhase::Running
    }

    pub fn job_state(&self) -> Option<JobState> {
        self.inner.state_tx.borrow().clone()
    }

    pub fn task_state(&self, item_id: &str) -> Option<DownloadTaskState> {
        self.inner
            .state_tx
            .borrow()
            .as_ref()
            .and_then(|state| state.tasks.get(item_id).cloned())
    }

    /// Every task's state in input order.
    pub fn all_task_states(&self) -> Vec<DownloadTaskState> {
        self.inner
            .state_tx
            .borrow()
            .as_ref()
            .map(|state| state.tasks.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> JobSummary {
        aggregator::summarize(self.inner.state_tx.borrow().as_ref())
    }

    /// Live feed of job state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Option<JobState>> {
        self.inner.state_tx.subscribe()
    }
}

fn validate(items: &[DownloadItem]) -> Result<(), FetchError> {
    if items.is_empty() {
        return Err(FetchError::Validation("no items to download".into()));
    }
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item.id()) {
            return Err(FetchError::Validation(format!("duplicate item id {}", item.id())));
        }
    }
    Ok(())
}

/// Sleep between batches or chunks; `false` when cancelled meanwhile.
async fn pause(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        () = token.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

async fn run_sequential(executor: &Arc<TaskExecutor>, items: &[DownloadItem], token: &CancellationToken) {
    for item in items {
        if token.is_cancelled() {
            debug!("Cancelled, not starting remaining items.");
            break;
        }
        executor.execute(item, token).await;
    }
}

/// Launch fixed-size batches, each fully resolved before the next one starts.
async fn run_batches(
    executor: &Arc<TaskExecutor>,
    items: &[DownloadItem],
    token: &CancellationToken,
    batch_size: usize,
    batch_pause: Duration,
) {
    for (index, batch) in items.chunks(batch_size.max(1)).enumerate() {
        if index > 0 && !pause(token, batch_pause).await {
            break;
        }
        if token.is_cancelled() {
            debug!(batch = index, "Cancelled, not starting remaining batches.");
            break;
        }
        debug!(batch = index, size = batch.len(), "Launching batch.");
        run_batch(executor, batch, token).await;
    }
}

async fn run_batch(executor: &Arc<TaskExecutor>, batch: &[DownloadItem], token: &CancellationToken) {
    let mut tasks = JoinSet::new();
    for item in batch {
        let executor = executor.clone();
        let item = item.clone();
        let token = token.clone();
        tasks.spawn(async move { executor.execute(&item, &token).await });
    }
    let mut aborted = false;
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            error!(error = %err, "Download task aborted.");
            aborted = true;
        }
    }
    if aborted {
        executor.abandon_unfinished(batch);
    }
}

async fn run_chunked(
    executor: &Arc<TaskExecutor>,
    items: &[DownloadItem],
    token: &CancellationToken,
    config: &JobConfig,
    speed: SpeedClass,
) {
    for (index, chunk) in items.chunks(config.chunk_size.max(1)).enumerate() {
        if index > 0 && !pause(token, speed.chunk_pause()).await {
            break;
        }
        if token.is_cancelled() {
            debug!(chunk = index, "Cancelled, not starting remaining chunks.");
            break;
        }
        info!(chunk = index, size = chunk.len(), "Starting chunk.");
        run_batches(executor, chunk, token, config.max_concurrent, speed.batch_pause()).await;
    }
}

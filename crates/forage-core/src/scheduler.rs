use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::pool::ResourcePool;
use crate::progress::{ProgressObserver, ProgressTracker};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::task::{ScrapeTask, TaskResult};
use crate::traits::{Extractor, ResourceFactory};
use crate::util::uniform_between;

/// Values consumed by [`Scheduler::run`]. `max_workers` is independent of
/// the pool size; extra workers just wait longer on acquire.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_workers: usize,
    /// Retry budget seeded into every task.
    pub max_retries: u32,
    /// Pacing delay bounds applied before every extraction attempt.
    pub rate_limit_min: Duration,
    pub rate_limit_max: Duration,
    pub retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            max_retries: 3,
            rate_limit_min: Duration::from_secs(2),
            rate_limit_max: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    /// Reject configurations that could never make progress. Called once
    /// before any task dispatch; the run aborts here rather than
    /// producing a crippled result set.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_workers == 0 {
            return Err(AppError::Config("max_workers must be >= 1".into()));
        }
        if self.rate_limit_min > self.rate_limit_max {
            return Err(AppError::Config(
                "rate_limit_min must not exceed rate_limit_max".into(),
            ));
        }
        if self.retry.backoff_base <= 1.0 {
            return Err(AppError::Config("retry_backoff_base must be > 1".into()));
        }
        Ok(())
    }
}

/// Runs a fixed number of concurrent workers over a task list.
///
/// Each worker pulls the next unprocessed task from a shared queue
/// (work-stealing, so one slow task never starves the others), performs
/// acquire → pace → extract → release with retry, and streams the
/// terminal result to a coordinator that tracks progress and notifies
/// the observer. The final result list is sorted by task index: callers
/// may rely on `results[i]` matching `targets[i]` on full runs.
pub struct Scheduler<F, E>
where
    F: ResourceFactory + Send + Sync + 'static,
    E: Extractor<F::Resource> + Clone + 'static,
{
    pool: Arc<ResourcePool<F>>,
    extractor: E,
    config: SchedulerConfig,
}

impl<F, E> Scheduler<F, E>
where
    F: ResourceFactory + Send + Sync + 'static,
    E: Extractor<F::Resource> + Clone + 'static,
{
    pub fn new(pool: Arc<ResourcePool<F>>, extractor: E, config: SchedulerConfig) -> Self {
        Self {
            pool,
            extractor,
            config,
        }
    }

    /// Process every target and return one result per finalized task,
    /// sorted by input position.
    ///
    /// Cancellation is cooperative: once `cancel` fires, workers finish
    /// their in-flight attempt but start no new tasks or retries, and the
    /// run returns whatever completed. Per-task failures never cross this
    /// boundary; only setup errors do.
    pub async fn run<O: ProgressObserver>(
        &self,
        targets: Vec<String>,
        cancel: CancellationToken,
        observer: &O,
    ) -> Result<Vec<TaskResult>, AppError> {
        self.config.validate()?;

        let total = targets.len();
        let tracker = ProgressTracker::new(total);
        if targets.is_empty() {
            tracing::warn!("No targets provided, nothing to do");
            observer.on_task(&tracker.snapshot(), None);
            return Ok(Vec::new());
        }

        tracing::info!(
            total,
            workers = self.config.max_workers,
            "Starting run"
        );

        let queue: Arc<Mutex<VecDeque<ScrapeTask>>> = Arc::new(Mutex::new(
            targets
                .iter()
                .enumerate()
                .map(|(index, target)| ScrapeTask::new(target.clone(), index, self.config.max_retries))
                .collect(),
        ));

        let (results_tx, mut results_rx) = mpsc::channel::<TaskResult>(total);

        let mut workers = JoinSet::new();
        for n in 0..self.config.max_workers {
            let ctx = WorkerContext {
                worker_id: format!("worker-{n}"),
                pool: Arc::clone(&self.pool),
                extractor: self.extractor.clone(),
                rate_limit_min: self.config.rate_limit_min,
                rate_limit_max: self.config.rate_limit_max,
                retry: self.config.retry.clone(),
                cancel: cancel.clone(),
                queue: Arc::clone(&queue),
                results: results_tx.clone(),
            };
            workers.spawn(ctx.run());
        }
        drop(results_tx);

        // Coordinator: record progress and notify as results stream in.
        let mut results = Vec::with_capacity(total);
        while let Some(result) = results_rx.recv().await {
            tracker.record(&result);
            let snapshot = tracker.snapshot();
            observer.on_task(&snapshot, Some(&result));
            results.push(result);
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker aborted unexpectedly");
            }
        }

        let snapshot = tracker.snapshot();
        observer.on_task(&snapshot, None);
        tracing::info!(
            completed = snapshot.completed_tasks,
            failed = snapshot.failed_tasks,
            elapsed_secs = snapshot.elapsed.as_secs_f64(),
            "Run finished"
        );

        results.sort_by_key(|r| r.index);
        Ok(results)
    }
}

struct WorkerContext<F: ResourceFactory, E> {
    worker_id: String,
    pool: Arc<ResourcePool<F>>,
    extractor: E,
    rate_limit_min: Duration,
    rate_limit_max: Duration,
    retry: RetryPolicy,
    cancel: CancellationToken,
    queue: Arc<Mutex<VecDeque<ScrapeTask>>>,
    results: mpsc::Sender<TaskResult>,
}

impl<F, E> WorkerContext<F, E>
where
    F: ResourceFactory + Send + Sync + 'static,
    E: Extractor<F::Resource>,
{
    async fn run(self) {
        tracing::debug!(worker_id = %self.worker_id, "Worker started");
        loop {
            // Shutdown checkpoint: no new task dispatch once requested.
            if self.cancel.is_cancelled() {
                tracing::info!(worker_id = %self.worker_id, "Shutdown requested, worker stopping");
                break;
            }
            let Some(mut task) = self.queue.lock().unwrap().pop_front() else {
                break;
            };
            if let Some(result) = self.process(&mut task).await {
                if self.results.send(result).await.is_err() {
                    break;
                }
            }
        }
        tracing::debug!(worker_id = %self.worker_id, "Worker stopped");
    }

    /// Drive one task to a terminal result through an explicit retry loop.
    ///
    /// Returns `None` only when shutdown pre-empts the task before its
    /// first attempt; any started task always finalizes.
    async fn process(&self, task: &mut ScrapeTask) -> Option<TaskResult> {
        let started = Instant::now();
        tracing::info!(
            worker_id = %self.worker_id,
            index = task.index,
            target = %task.target,
            "Processing task"
        );

        loop {
            // Shutdown checkpoint: before acquiring a resource.
            if self.cancel.is_cancelled() {
                return if task.retry_count == 0 {
                    None
                } else {
                    Some(TaskResult::failed(
                        task,
                        "shutdown requested during retry",
                        started.elapsed(),
                    ))
                };
            }

            let error = match self.attempt(task).await {
                Ok(payload) => {
                    let duration = started.elapsed();
                    tracing::info!(
                        worker_id = %self.worker_id,
                        index = task.index,
                        elapsed_ms = duration.as_millis() as u64,
                        "Task completed"
                    );
                    return Some(TaskResult::completed(task, payload, duration));
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                tracing::warn!(
                    worker_id = %self.worker_id,
                    index = task.index,
                    error = %error,
                    "Task failed, not retryable"
                );
                return Some(TaskResult::failed(task, error.to_string(), started.elapsed()));
            }

            match self
                .retry
                .decide(task.retry_count, task.max_retries, self.cancel.is_cancelled())
            {
                RetryDecision::Retry { delay } => {
                    task.retry_count += 1;
                    tracing::info!(
                        worker_id = %self.worker_id,
                        index = task.index,
                        attempt = task.retry_count,
                        max_retries = task.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying task"
                    );
                    // Shutdown checkpoint: the backoff sleep is abandoned
                    // on cancellation and the task finalizes as failed.
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.cancel.cancelled() => {
                            return Some(TaskResult::failed(
                                task,
                                error.to_string(),
                                started.elapsed(),
                            ));
                        }
                    }
                }
                RetryDecision::Stop => {
                    tracing::warn!(
                        worker_id = %self.worker_id,
                        index = task.index,
                        attempts = task.retry_count + 1,
                        error = %error,
                        "Task failed"
                    );
                    return Some(TaskResult::failed(task, error.to_string(), started.elapsed()));
                }
            }
        }
    }

    /// One unit of work: acquire a resource, pace, extract, always release.
    async fn attempt(&self, task: &ScrapeTask) -> Result<serde_json::Value, AppError> {
        let guard = self.pool.acquire().await?;

        // Pacing against the target service.
        let delay = uniform_between(self.rate_limit_min, self.rate_limit_max);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = self.extractor.extract(&guard, &task.target).await;
        self.pool.release(guard).await;
        outcome
    }
}

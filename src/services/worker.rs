use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::db::repository::OrderAccess;
use crate::handlers::HandlerRegistry;
use crate::models::job::Job;
use crate::services::queue::Broker;
use crate::services::retry::RetryPolicy;

pub const DEFAULT_CONCURRENCY: usize = 20;

/// What happened to a job after one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Failed and re-submitted; `retried` counts retries scheduled so far.
    Retrying { retried: u32, delay: Duration },
    /// Failed with no retries left.
    Exhausted { attempts: u32 },
    /// Dropped without retry: unknown task type, bad payload or permanent error.
    Rejected { reason: String },
}

impl JobOutcome {
    fn label(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Retrying { .. } => "retrying",
            JobOutcome::Exhausted { .. } => "exhausted",
            JobOutcome::Rejected { .. } => "rejected",
        }
    }
}

struct PoolInner {
    broker: Arc<dyn Broker>,
    registry: HandlerRegistry,
    orders: OrderAccess,
    retry: RetryPolicy,
}

/// Fixed-size set of executors pulling from one broker.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    concurrency: usize,
}

/// Running executors; dropping it without `shutdown` aborts them.
pub struct WorkerPoolHandle {
    shutdown_tx: watch::Sender<bool>,
    executors: JoinSet<()>,
}

impl WorkerPool {
    pub fn new(
        broker: Arc<dyn Broker>,
        registry: HandlerRegistry,
        orders: OrderAccess,
        retry: RetryPolicy,
        concurrency: usize,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                broker,
                registry,
                orders,
                retry,
            }),
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Spawn the executors.
    pub fn start(&self) -> WorkerPoolHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut executors = JoinSet::new();

        for worker_id in 0..self.concurrency {
            let pool = self.clone();
            let mut shutdown = shutdown_rx.clone();
            executors.spawn(async move {
                tracing::debug!(worker_id, "Executor started");
                loop {
                    let job = tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        job = pool.inner.broker.take() => job,
                    };
                    pool.process(job).await;
                }
                tracing::debug!(worker_id, "Executor stopped");
            });
        }

        tracing::info!(concurrency = self.concurrency, "Worker pool started");
        WorkerPoolHandle {
            shutdown_tx,
            executors,
        }
    }

    /// Execute one job under its timeout and apply the retry policy.
    pub async fn process(&self, job: Job) -> JobOutcome {
        let task_type = job.task_type.clone();
        let job_id = job.id;
        let started = Instant::now();
        let (outcome, settled) = self.run(job).await;

        // An unsettled job keeps its broker lease and is delivered again.
        if settled {
            if let Err(e) = self.inner.broker.complete(job_id).await {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to acknowledge job");
            }
        }

        metrics::counter!(
            "order_jobs_total",
            "task_type" => task_type.clone(),
            "outcome" => outcome.label()
        )
        .increment(1);
        metrics::histogram!("order_job_duration_seconds", "task_type" => task_type)
            .record(started.elapsed().as_secs_f64());

        outcome
    }

    /// Returns the outcome and whether the broker may forget the delivery.
    async fn run(&self, mut job: Job) -> (JobOutcome, bool) {
        let inner = &self.inner;
        let handler = match inner.registry.resolve(&job.task_type) {
            Some(h) => h,
            None => {
                tracing::error!(
                    job_id = %job.id,
                    task_type = %job.task_type,
                    "No handler for task type, dropping job"
                );
                let reason = format!("unknown task type '{}'", job.task_type);
                return (JobOutcome::Rejected { reason }, true);
            }
        };

        tracing::debug!(
            job_id = %job.id,
            task_type = %job.task_type,
            attempt = job.attempt(),
            "Executing job"
        );

        let execution = handler.execute(&job, &inner.orders);
        let error = match timeout(job.options.timeout, execution).await {
            Ok(Ok(())) => {
                tracing::info!(
                    job_id = %job.id,
                    task_type = %job.task_type,
                    attempt = job.attempt(),
                    "Job completed"
                );
                return (JobOutcome::Completed, true);
            }
            Ok(Err(e)) if !e.is_retryable() => {
                tracing::error!(
                    job_id = %job.id,
                    task_type = %job.task_type,
                    error = %e,
                    "Job failed permanently, dropping"
                );
                let reason = e.to_string();
                return (JobOutcome::Rejected { reason }, true);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", job.options.timeout),
        };

        if !inner.retry.should_retry(&job) {
            tracing::warn!(
                job_id = %job.id,
                task_type = %job.task_type,
                attempts = job.attempt(),
                error = %error,
                "Job failed after max retries"
            );
            let attempts = job.attempt();
            return (JobOutcome::Exhausted { attempts }, true);
        }

        let delay = inner.retry.backoff(job.id, job.retried);
        job.retried += 1;
        let retried = job.retried;
        let job_id = job.id;
        let task_type = job.task_type.clone();

        match inner.broker.submit(job, delay).await {
            Ok(()) => {
                tracing::warn!(
                    job_id = %job_id,
                    task_type = %task_type,
                    retried,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Job failed, re-queued for retry"
                );
                (JobOutcome::Retrying { retried, delay }, true)
            }
            Err(e) => {
                tracing::error!(
                    job_id = %job_id,
                    task_type = %task_type,
                    error = %e,
                    "Failed to re-queue job, leaving it unacknowledged"
                );
                let reason = format!("re-queue failed: {}", e);
                (JobOutcome::Rejected { reason }, false)
            }
        }
    }
}

impl WorkerPoolHandle {
    /// Stop taking new jobs, let in-flight jobs finish and wait for every executor.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        while let Some(result) = self.executors.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Executor terminated abnormally");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

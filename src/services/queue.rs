use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

use crate::models::job::{Job, Priority};

/// Job broker contract shared by the in-process and Redis transports.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Make `job` visible to consumers no earlier than `now + delay`.
    async fn submit(&self, job: Job, delay: Duration) -> Result<(), QueueError>;

    /// Wait for an eligible job and hand it to exactly one caller.
    async fn take(&self) -> Job;

    /// Acknowledge a taken job once its outcome is settled (done, dropped or
    /// re-submitted). Transports that lease claimed jobs release the lease.
    async fn complete(&self, _job_id: Uuid) -> Result<(), QueueError> {
        Ok(())
    }

    /// Number of jobs waiting, eligible or not.
    async fn pending(&self) -> Result<u64, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Relative service weights of the four priority classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueWeights {
    pub critical: u32,
    pub high: u32,
    pub default: u32,
    pub low: u32,
}

impl Default for QueueWeights {
    fn default() -> Self {
        Self {
            critical: 6,
            high: 4,
            default: 2,
            low: 1,
        }
    }
}

impl QueueWeights {
    pub fn weight(&self, priority: Priority) -> u32 {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Default => self.default,
            Priority::Low => self.low,
        }
    }

    pub fn total(&self) -> u32 {
        Priority::ALL.iter().map(|p| self.weight(*p)).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingPolicy {
    /// Always drain a higher class before touching a lower one.
    Strict,
    /// Smooth weighted round-robin across classes that have eligible work.
    Weighted(QueueWeights),
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        SchedulingPolicy::Weighted(QueueWeights::default())
    }
}

/// Decides which priority class the next job is taken from.
#[derive(Debug)]
pub struct PriorityScheduler {
    policy: SchedulingPolicy,
    credit: [i64; 4],
}

impl PriorityScheduler {
    pub fn new(policy: SchedulingPolicy) -> Self {
        Self {
            policy,
            credit: [0; 4],
        }
    }

    pub fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    /// Pick among the classes that currently have eligible work.
    ///
    /// With weights `w`, every class with backlog is served `w / sum(w)` of
    /// the time, and the highest class always wins the first pick.
    pub fn pick(&mut self, eligible: &[Priority]) -> Option<Priority> {
        let mut ranked: Vec<Priority> = eligible.to_vec();
        ranked.sort();
        ranked.dedup();

        let weights = match self.policy {
            SchedulingPolicy::Strict => return ranked.first().copied(),
            SchedulingPolicy::Weighted(weights) => weights,
        };

        let mut total = 0i64;
        let mut chosen: Option<Priority> = None;
        for &priority in &ranked {
            let weight = i64::from(weights.weight(priority));
            total += weight;
            self.credit[priority.index()] += weight;
            let better = match chosen {
                None => true,
                Some(current) => self.credit[priority.index()] > self.credit[current.index()],
            };
            if better {
                chosen = Some(priority);
            }
        }

        if let Some(priority) = chosen {
            self.credit[priority.index()] -= total;
        }
        chosen
    }
}

struct QueueState {
    queues: [BTreeMap<(Instant, u64), Job>; 4],
    seq: u64,
    scheduler: PriorityScheduler,
}

impl QueueState {
    fn pop_eligible(&mut self, now: Instant) -> Option<Job> {
        let eligible: Vec<Priority> = Priority::ALL
            .into_iter()
            .filter(|p| {
                self.queues[p.index()]
                    .first_key_value()
                    .is_some_and(|((ready_at, _), _)| *ready_at <= now)
            })
            .collect();

        let priority = self.scheduler.pick(&eligible)?;
        self.queues[priority.index()]
            .pop_first()
            .map(|(_, job)| job)
    }

    fn next_ready_at(&self) -> Option<Instant> {
        self.queues
            .iter()
            .filter_map(|q| q.first_key_value().map(|((ready_at, _), _)| *ready_at))
            .min()
    }
}

/// Process-local broker: one time-ordered queue per priority class.
///
/// Within a class, jobs are released by eligible time and then by submission
/// order.
pub struct InMemoryBroker {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl InMemoryBroker {
    pub fn new(policy: SchedulingPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState {
                queues: Default::default(),
                seq: 0,
                scheduler: PriorityScheduler::new(policy),
            }),
            notify: Notify::new(),
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(SchedulingPolicy::default())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn submit(&self, job: Job, delay: Duration) -> Result<(), QueueError> {
        let ready_at = Instant::now() + delay;
        {
            let mut state = self.state.lock().await;
            state.seq += 1;
            let key = (ready_at, state.seq);
            state.queues[job.priority().index()].insert(key, job);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn take(&self) -> Job {
        loop {
            // Register for wakeups before inspecting the queues so a submit
            // landing in between is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_ready = {
                let mut state = self.state.lock().await;
                if let Some(job) = state.pop_eligible(Instant::now()) {
                    return job;
                }
                state.next_ready_at()
            };

            match next_ready {
                Some(at) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn pending(&self) -> Result<u64, QueueError> {
        let state = self.state.lock().await;
        Ok(state.queues.iter().map(|q| q.len() as u64).sum())
    }
}

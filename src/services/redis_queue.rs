use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tokio::time::sleep;
use uuid::Uuid;

use crate::models::job::{Job, Priority};
use crate::services::queue::{Broker, PriorityScheduler, QueueError, SchedulingPolicy};

const QUEUE_PREFIX: &str = "orders:queue";
/// Claimed members, scored by the time their lease runs out.
const PROCESSING_KEY: &str = "orders:queue:processing";
/// Submission counter; orders members that become ready in the same millisecond.
const SEQUENCE_KEY: &str = "orders:queue:seq";
const POLL_INTERVAL_MS: u64 = 250;
const ERROR_BACKOFF_MS: u64 = 1000;
/// Added to the job timeout when leasing a claimed job.
const LEASE_GRACE_MS: u64 = 30_000;

/// Moves ARGV[1] from KEYS[1] to KEYS[2] with score ARGV[2]. Returns 1 only
/// for the caller that removed it.
const MOVE_SCRIPT: &str = r#"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 1 then
    redis.call('ZADD', KEYS[2], ARGV[2], ARGV[1])
    return 1
end
return 0
"#;

fn queue_key(priority: Priority) -> String {
    format!("{}:{}", QUEUE_PREFIX, priority)
}

/// `<seq>|<json>`, with the sequence zero-padded so members sharing a score
/// sort in submission order.
fn encode_member(seq: u64, job: &Job) -> Result<String, QueueError> {
    let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
    Ok(format!("{:020}|{}", seq, payload))
}

fn decode_member(member: &str) -> Result<Job, QueueError> {
    let payload = member.split_once('|').map_or(member, |(_, json)| json);
    serde_json::from_str(payload).map_err(QueueError::Serialize)
}

enum Claim {
    Taken(Job),
    /// Another consumer removed the member first.
    Raced,
    Empty,
}

/// Redis-backed broker: one sorted set per priority class, scored by the
/// earliest execution time in milliseconds.
///
/// A claimed member moves atomically into a processing set scored by its
/// lease deadline and leaves it on [`Broker::complete`]. Leases that run out
/// (the consumer died mid-job) are moved back to their class queue by any
/// polling consumer, so delivery is at least once.
pub struct RedisBroker {
    client: redis::Client,
    scheduler: Mutex<PriorityScheduler>,
    poll_interval: Duration,
    lease_grace: Duration,
    move_script: redis::Script,
    /// Members claimed by this process, keyed by job id.
    claimed: Mutex<HashMap<Uuid, String>>,
}

impl RedisBroker {
    pub fn new(redis_url: &str, policy: SchedulingPolicy) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            scheduler: Mutex::new(PriorityScheduler::new(policy)),
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            lease_grace: Duration::from_millis(LEASE_GRACE_MS),
            move_script: redis::Script::new(MOVE_SCRIPT),
            claimed: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_lease_grace(mut self, lease_grace: Duration) -> Self {
        self.lease_grace = lease_grace;
        self
    }

    async fn connection(&self) -> Result<MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }

    fn lease_deadline(&self, now_ms: i64, job: &Job) -> i64 {
        now_ms + (job.options.timeout + self.lease_grace).as_millis() as i64
    }

    /// Move members whose lease ran out back to their class queue, ready now.
    async fn requeue_expired(
        &self,
        conn: &mut MultiplexedConnection,
        now_ms: i64,
    ) -> Result<(), QueueError> {
        let expired: Vec<String> = conn
            .zrangebyscore(PROCESSING_KEY, "-inf", now_ms)
            .await
            .map_err(QueueError::Redis)?;

        for member in expired {
            let priority = match decode_member(&member) {
                Ok(job) => job.priority(),
                Err(e) => {
                    tracing::error!(error = %e, "Dropping malformed leased job");
                    conn.zrem::<_, _, ()>(PROCESSING_KEY, &member)
                        .await
                        .map_err(QueueError::Redis)?;
                    continue;
                }
            };
            let moved: i64 = self
                .move_script
                .key(PROCESSING_KEY)
                .key(queue_key(priority))
                .arg(&member)
                .arg(now_ms)
                .invoke_async(&mut *conn)
                .await
                .map_err(QueueError::Redis)?;
            if moved == 1 {
                tracing::warn!(priority = %priority, "Lease expired, job re-queued");
            }
        }
        Ok(())
    }

    async fn try_claim(&self) -> Result<Claim, QueueError> {
        let mut conn = self.connection().await?;
        let now_ms = Utc::now().timestamp_millis();
        self.requeue_expired(&mut conn, now_ms).await?;

        let mut eligible = Vec::new();
        for priority in Priority::ALL {
            let count: u64 = conn
                .zcount(queue_key(priority), "-inf", now_ms)
                .await
                .map_err(QueueError::Redis)?;
            if count > 0 {
                eligible.push(priority);
            }
        }

        let priority = match self.scheduler.lock().await.pick(&eligible) {
            Some(p) => p,
            None => return Ok(Claim::Empty),
        };
        let key = queue_key(priority);

        let members: Vec<String> = conn
            .zrangebyscore_limit(&key, "-inf", now_ms, 0, 1)
            .await
            .map_err(QueueError::Redis)?;
        let member = match members.into_iter().next() {
            Some(m) => m,
            None => return Ok(Claim::Raced),
        };

        let job = match decode_member(&member) {
            Ok(job) => job,
            Err(e) => {
                conn.zrem::<_, _, ()>(&key, &member).await.map_err(QueueError::Redis)?;
                return Err(e);
            }
        };

        // The move succeeds for exactly one consumer.
        let moved: i64 = self
            .move_script
            .key(&key)
            .key(PROCESSING_KEY)
            .arg(&member)
            .arg(self.lease_deadline(now_ms, &job))
            .invoke_async(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        if moved == 0 {
            return Ok(Claim::Raced);
        }

        self.claimed.lock().await.insert(job.id, member);
        Ok(Claim::Taken(job))
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn submit(&self, job: Job, delay: Duration) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let seq: u64 = conn.incr(SEQUENCE_KEY, 1).await.map_err(QueueError::Redis)?;
        let member = encode_member(seq, &job)?;
        let ready_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        conn.zadd::<_, _, _, ()>(queue_key(job.priority()), &member, ready_at)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn take(&self) -> Job {
        loop {
            match self.try_claim().await {
                Ok(Claim::Taken(job)) => return job,
                Ok(Claim::Raced) => continue,
                Ok(Claim::Empty) => sleep(self.poll_interval).await,
                Err(QueueError::Serialize(e)) => {
                    tracing::error!(error = %e, "Dropping malformed job from queue");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to poll job queue, will retry");
                    sleep(Duration::from_millis(ERROR_BACKOFF_MS)).await;
                }
            }
        }
    }

    /// Release the lease of a job this process claimed.
    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        let member = match self.claimed.lock().await.remove(&job_id) {
            Some(m) => m,
            None => return Ok(()),
        };
        let mut conn = self.connection().await?;
        conn.zrem::<_, _, ()>(PROCESSING_KEY, &member)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn pending(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let mut depth = 0u64;
        for priority in Priority::ALL {
            let len: u64 = conn.zcard(queue_key(priority)).await.map_err(QueueError::Redis)?;
            depth += len;
        }
        Ok(depth)
    }

    /// Check Redis connectivity (for health checks).
    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

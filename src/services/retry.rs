use std::time::Duration;

use uuid::Uuid;

use crate::models::job::Job;

/// Exponential backoff with bounded, job-derived jitter.
///
/// The delay for retry `n` is `base * 2^n` plus up to half of that again,
/// clamped to `max`. Jitter never pushes a delay past the un-jittered delay
/// of the following retry, so delays are non-decreasing in `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(300))
    }
}

impl RetryPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: true,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn max_delay(&self) -> Duration {
        self.max
    }

    /// Whether a job that just failed may run again.
    pub fn should_retry(&self, job: &Job) -> bool {
        job.retried < job.options.max_retries
    }

    /// Delay before the retry that follows `retried` previous retries.
    pub fn backoff(&self, job_id: Uuid, retried: u32) -> Duration {
        let factor = 1u32.checked_shl(retried.min(31)).unwrap_or(u32::MAX);
        let exp = self.base.saturating_mul(factor).min(self.max);
        if !self.jitter {
            return exp;
        }
        let spread = exp / 2;
        (exp + spread.mul_f64(jitter_fraction(job_id, retried))).min(self.max)
    }
}

/// Deterministic fraction in `[0, 1)` derived from the job id and retry number.
fn jitter_fraction(job_id: Uuid, retried: u32) -> f64 {
    let mixed = job_id.as_u128() ^ u128::from(retried).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let folded = (mixed as u64) ^ ((mixed >> 64) as u64);
    (folded % 1000) as f64 / 1000.0
}

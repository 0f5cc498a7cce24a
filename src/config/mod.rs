use std::time::Duration;

use serde::Deserialize;

use crate::services::integrations::SimulatedLatency;
use crate::services::queue::{QueueWeights, SchedulingPolicy};
use crate::services::retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Env(#[from] envy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// API server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string. Orders are kept in memory when unset.
    pub database_url: Option<String>,

    /// Redis connection string. The API falls back to an in-process broker
    /// and embedded workers when unset; the worker binary requires it.
    pub redis_url: Option<String>,

    #[serde(default = "default_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default = "default_weight_critical")]
    pub queue_weight_critical: u32,
    #[serde(default = "default_weight_high")]
    pub queue_weight_high: u32,
    #[serde(default = "default_weight_default")]
    pub queue_weight_default: u32,
    #[serde(default = "default_weight_low")]
    pub queue_weight_low: u32,

    /// Always drain higher classes first instead of weighted selection.
    #[serde(default)]
    pub strict_priority: bool,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,

    /// Prometheus exporter address for the worker process
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,

    /// Sleep in the simulated integrations to mimic real service latency
    #[serde(default = "default_true")]
    pub simulate_latency: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_concurrency() -> usize {
    crate::services::worker::DEFAULT_CONCURRENCY
}

fn default_weight_critical() -> u32 {
    6
}

fn default_weight_high() -> u32 {
    4
}

fn default_weight_default() -> u32 {
    2
}

fn default_weight_low() -> u32 {
    1
}

fn default_retry_base_ms() -> u64 {
    1_000
}

fn default_retry_max_ms() -> u64 {
    300_000
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9091".to_string()
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Build from explicit key/value pairs, using the same names as the environment.
    pub fn from_iter<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_concurrency == 0 {
            return Err(ConfigError::Invalid("WORKER_CONCURRENCY must be at least 1".into()));
        }
        let weights = self.queue_weights();
        if !self.strict_priority && weights.total() == 0 {
            return Err(ConfigError::Invalid("at least one queue weight must be non-zero".into()));
        }
        if self.retry_base_ms > self.retry_max_ms {
            return Err(ConfigError::Invalid(format!(
                "RETRY_BASE_MS ({}) exceeds RETRY_MAX_MS ({})",
                self.retry_base_ms, self.retry_max_ms
            )));
        }
        Ok(())
    }

    pub fn queue_weights(&self) -> QueueWeights {
        QueueWeights {
            critical: self.queue_weight_critical,
            high: self.queue_weight_high,
            default: self.queue_weight_default,
            low: self.queue_weight_low,
        }
    }

    pub fn scheduling_policy(&self) -> SchedulingPolicy {
        if self.strict_priority {
            SchedulingPolicy::Strict
        } else {
            SchedulingPolicy::Weighted(self.queue_weights())
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry_base_ms),
            Duration::from_millis(self.retry_max_ms),
        )
    }

    pub fn latency(&self) -> SimulatedLatency {
        if self.simulate_latency {
            SimulatedLatency::realistic()
        } else {
            SimulatedLatency::none()
        }
    }
}

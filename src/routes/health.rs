use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub repository: ComponentHealth,
    pub broker: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
    /// Jobs waiting in the broker, ready or delayed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<u64>,
}

impl ComponentHealth {
    fn ok(latency_ms: u64) -> Self {
        Self {
            status: "ok".to_string(),
            latency_ms: Some(latency_ms),
            pending: None,
        }
    }

    fn error() -> Self {
        Self {
            status: "error".to_string(),
            latency_ms: None,
            pending: None,
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// GET /health: order store and job broker status.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();
    let repository = match state.repository.health_check().await {
        Ok(()) => ComponentHealth::ok(start.elapsed().as_millis() as u64),
        Err(e) => {
            tracing::warn!(error = %e, "Order repository health check failed");
            ComponentHealth::error()
        }
    };

    let broker_start = std::time::Instant::now();
    let broker = match state.broker.health_check().await {
        Ok(()) => {
            let mut health = ComponentHealth::ok(broker_start.elapsed().as_millis() as u64);
            health.pending = state.broker.pending().await.ok();
            health
        }
        Err(e) => {
            tracing::warn!(error = %e, "Broker health check failed");
            ComponentHealth::error()
        }
    };

    let all_healthy = repository.is_ok() && broker.is_ok();
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks { repository, broker },
    };

    (status_code, Json(response))
}

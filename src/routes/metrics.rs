use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Prometheus scrape endpoint, text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for the pipeline metrics.
pub fn describe() {
    metrics::describe_counter!("orders_created_total", "Orders accepted by the API");
    metrics::describe_counter!(
        "order_jobs_submitted_total",
        "Fulfillment jobs submitted to the broker"
    );
    metrics::describe_counter!(
        "order_jobs_total",
        "Fulfillment job executions by outcome"
    );
    metrics::describe_histogram!(
        "order_job_duration_seconds",
        "Time spent executing one fulfillment job"
    );
}

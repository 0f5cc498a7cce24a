use metrics_exporter_prometheus::PrometheusBuilder;
use order_fulfillment::{
    config::AppConfig,
    db::{self, OrderAccess},
    handlers::HandlerRegistry,
    routes,
    services::{
        integrations::Integrations,
        redis_queue::RedisBroker,
        worker::{shutdown_signal, WorkerPool},
    },
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting order fulfillment worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");
    let redis_url = config
        .redis_url
        .as_deref()
        .expect("REDIS_URL is required by the worker");
    let database_url = config
        .database_url
        .as_deref()
        .expect("DATABASE_URL is required by the worker");

    let metrics_addr: SocketAddr = config
        .metrics_addr
        .parse()
        .expect("METRICS_ADDR must be a socket address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus exporter");
    routes::metrics::describe();

    tracing::info!("Connecting to PostgreSQL");
    let repository = db::open_repository(Some(database_url))
        .await
        .expect("Failed to connect to database");

    tracing::info!("Connecting to Redis job broker");
    let broker = RedisBroker::new(redis_url, config.scheduling_policy())
        .expect("Failed to initialize Redis broker");

    let registry = HandlerRegistry::standard(&Integrations::simulated(config.latency()));
    tracing::info!(task_types = ?registry.task_types(), "Handlers registered");

    let pool = WorkerPool::new(
        Arc::new(broker),
        registry,
        OrderAccess::new(repository),
        config.retry_policy(),
        config.worker_concurrency,
    );
    let handle = pool.start();

    shutdown_signal().await;
    tracing::info!("Draining in-flight jobs");
    handle.shutdown().await;
}

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use order_fulfillment::{
    app_state::AppState,
    config::AppConfig,
    db::{self, OrderAccess},
    handlers::HandlerRegistry,
    routes,
    services::{
        integrations::Integrations,
        queue::{Broker, InMemoryBroker},
        redis_queue::RedisBroker,
        worker::{shutdown_signal, WorkerPool},
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing order-fulfillment server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe();

    let repository = db::open_repository(config.database_url.as_deref())
        .await
        .expect("Failed to open order repository");

    // Without Redis the API runs its own workers against an in-process broker.
    let (broker, embedded_pool): (Arc<dyn Broker>, _) = match &config.redis_url {
        Some(url) => {
            tracing::info!("Connecting to Redis job broker");
            let broker: Arc<dyn Broker> = Arc::new(
                RedisBroker::new(url, config.scheduling_policy())
                    .expect("Failed to initialize Redis broker"),
            );
            (broker, None)
        }
        None => {
            tracing::warn!("REDIS_URL not set, running embedded worker pool");
            let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new(config.scheduling_policy()));
            let pool = WorkerPool::new(
                broker.clone(),
                HandlerRegistry::standard(&Integrations::simulated(config.latency())),
                OrderAccess::new(repository.clone()),
                config.retry_policy(),
                config.worker_concurrency,
            );
            (broker, Some(pool.start()))
        }
    };

    let state = AppState::new(repository, broker);
    let app = Router::new()
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .merge(routes::router(state));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    if let Some(pool) = embedded_pool {
        pool.shutdown().await;
    }
    tracing::info!("Server stopped");
}

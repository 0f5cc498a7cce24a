use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;

pub mod queries;
pub mod repository;

pub use queries::PgOrderRepository;
pub use repository::{
    InMemoryOrderRepository, OrderAccess, OrderRepository, RepositoryError, UpdateError,
};

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// PostgreSQL-backed repository when a database URL is configured, otherwise
/// a process-local one.
pub async fn open_repository(
    database_url: Option<&str>,
) -> Result<Arc<dyn OrderRepository>, sqlx::Error> {
    match database_url {
        Some(url) => {
            let pool = init_pool(url).await?;
            run_migrations(&pool).await?;
            Ok(Arc::new(PgOrderRepository::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            Ok(Arc::new(InMemoryOrderRepository::new()))
        }
    }
}

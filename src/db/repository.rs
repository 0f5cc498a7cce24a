use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::order::{Order, OrderError};

/// How many times a conflicting read-modify-write is replayed before giving up.
const MAX_UPDATE_ATTEMPTS: u32 = 5;

/// Storage contract for orders.
///
/// `update` is conditional: it only succeeds when the stored version equals
/// `order.version`, and returns the stored order with its new version.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: &Order) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Order, RepositoryError>;

    async fn find_by_customer(&self, customer_id: &str) -> Result<Vec<Order>, RepositoryError>;

    async fn find_all(&self) -> Result<Vec<Order>, RepositoryError>;

    async fn update(&self, order: &Order) -> Result<Order, RepositoryError>;

    async fn health_check(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("order not found: {0}")]
    NotFound(String),

    #[error("order {id} was modified concurrently (expected version {expected})")]
    Conflict { id: String, expected: i64 },

    #[error("order already exists: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored order is malformed: {0}")]
    Corrupt(String),
}

/// Failure of a read-modify-write through [`OrderAccess::update`].
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Domain(#[from] OrderError),
}

/// The only path through which jobs and services mutate orders.
///
/// Every update re-reads the order, applies the caller's mutation to the fresh
/// copy and writes it back conditionally, so a writer only changes the fields
/// its mutation touches.
#[derive(Clone)]
pub struct OrderAccess {
    repo: Arc<dyn OrderRepository>,
}

impl OrderAccess {
    pub fn new(repo: Arc<dyn OrderRepository>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Arc<dyn OrderRepository> {
        &self.repo
    }

    pub async fn get(&self, id: &str) -> Result<Order, RepositoryError> {
        self.repo.find_by_id(id).await
    }

    pub async fn update<F>(&self, id: &str, mut mutate: F) -> Result<Order, UpdateError>
    where
        F: FnMut(&mut Order) -> Result<(), OrderError> + Send,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut order = self.repo.find_by_id(id).await?;
            mutate(&mut order)?;

            match self.repo.update(&order).await {
                Ok(stored) => return Ok(stored),
                Err(RepositoryError::Conflict { .. }) if attempt < MAX_UPDATE_ATTEMPTS => {
                    tracing::debug!(order_id = %id, attempt, "Order update conflicted, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Process-local repository used for development and tests.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<String, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(RepositoryError::Duplicate(order.id.clone()));
        }
        orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Order, RepositoryError> {
        self.orders
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn find_by_customer(&self, customer_id: &str) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn find_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self.orders.read().await.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update(&self, order: &Order) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&order.id)
            .ok_or_else(|| RepositoryError::NotFound(order.id.clone()))?;

        if stored.version != order.version {
            return Err(RepositoryError::Conflict {
                id: order.id.clone(),
                expected: order.version,
            });
        }

        let mut next = order.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }
}

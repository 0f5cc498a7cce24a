use std::sync::Arc;

use crate::db::repository::OrderRepository;
use crate::services::{order_service::OrderService, producer::TaskProducer, queue::Broker};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub repository: Arc<dyn OrderRepository>,
    pub broker: Arc<dyn Broker>,
}

impl AppState {
    pub fn new(repository: Arc<dyn OrderRepository>, broker: Arc<dyn Broker>) -> Self {
        let producer = TaskProducer::new(broker.clone());
        Self {
            orders: Arc::new(OrderService::new(repository.clone(), producer)),
            repository,
            broker,
        }
    }
}

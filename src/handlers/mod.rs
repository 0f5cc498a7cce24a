//! Job handlers: one per task type, dispatched by tag through [`HandlerRegistry`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::db::repository::{OrderAccess, RepositoryError, UpdateError};
use crate::models::job::{Job, TaskType};
use crate::services::integrations::Integrations;

pub mod analytics;
pub mod email;
pub mod inventory;
pub mod invoice;
pub mod payment;
pub mod warehouse;

pub use analytics::AnalyticsTrackHandler;
pub use email::EmailConfirmationHandler;
pub use inventory::InventoryUpdateHandler;
pub use invoice::InvoiceGenerateHandler;
pub use payment::PaymentProcessHandler;
pub use warehouse::WarehouseNotifyHandler;

/// Business logic for one task type.
///
/// Jobs are delivered at least once and an attempt may be abandoned at its
/// timeout, so `execute` must be safe to run again for the same payload.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn task_type(&self) -> TaskType;

    async fn execute(&self, job: &Job, orders: &OrderAccess) -> Result<(), HandlerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// External dependency failed; the job is rescheduled.
    #[error("transient failure: {0}")]
    Retryable(String),

    /// Retrying cannot help; the job is dropped.
    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl HandlerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Retryable(_))
    }
}

impl From<RepositoryError> for HandlerError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(_) | RepositoryError::Corrupt(_) => {
                HandlerError::Permanent(e.to_string())
            }
            RepositoryError::Conflict { .. }
            | RepositoryError::Duplicate(_)
            | RepositoryError::Database(_) => HandlerError::Retryable(e.to_string()),
        }
    }
}

impl From<UpdateError> for HandlerError {
    fn from(e: UpdateError) -> Self {
        match e {
            UpdateError::Repository(e) => e.into(),
            UpdateError::Domain(e) => HandlerError::Permanent(e.to_string()),
        }
    }
}

/// Task-type → handler table, built once at startup.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the six order-fulfillment handlers.
    pub fn standard(integrations: &Integrations) -> Self {
        let mut registry = Self::new();
        registry
            .register(PaymentProcessHandler::new(integrations.payments.clone()))
            .register(InventoryUpdateHandler::new(integrations.inventory.clone()))
            .register(EmailConfirmationHandler::new(integrations.email.clone()))
            .register(InvoiceGenerateHandler::new(integrations.invoices.clone()))
            .register(AnalyticsTrackHandler::new(integrations.analytics.clone()))
            .register(WarehouseNotifyHandler::new(
                integrations.warehouse.clone(),
                integrations.tracking.clone(),
            ));
        registry
    }

    pub fn register<H: JobHandler + 'static>(&mut self, handler: H) -> &mut Self {
        self.handlers.insert(handler.task_type(), Arc::new(handler));
        self
    }

    /// Resolve a raw task tag. Unknown or unregistered tags yield `None`.
    pub fn resolve(&self, tag: &str) -> Option<Arc<dyn JobHandler>> {
        let task_type = tag.parse::<TaskType>().ok()?;
        self.handlers.get(&task_type).cloned()
    }

    pub fn task_types(&self) -> Vec<TaskType> {
        TaskType::ALL
            .into_iter()
            .filter(|t| self.handlers.contains_key(t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{OrderError, OrderStatus};
    use crate::services::integrations::SimulatedLatency;

    #[test]
    fn test_standard_registry_covers_all_tasks() {
        let integrations = Integrations::simulated(SimulatedLatency::none());
        let registry = HandlerRegistry::standard(&integrations);
        assert_eq!(registry.task_types(), TaskType::ALL.to_vec());
        for task in TaskType::ALL {
            let handler = registry.resolve(&task.to_string()).unwrap();
            assert_eq!(handler.task_type(), task);
        }
    }

    #[test]
    fn test_unknown_tag_does_not_resolve() {
        let integrations = Integrations::simulated(SimulatedLatency::none());
        let registry = HandlerRegistry::standard(&integrations);
        assert!(registry.resolve("payment:refund").is_none());
        assert!(HandlerRegistry::new().resolve("payment:process").is_none());
    }

    #[test]
    fn test_error_classification() {
        assert!(HandlerError::Retryable("gateway down".into()).is_retryable());
        assert!(!HandlerError::Permanent("bad".into()).is_retryable());

        let not_found: HandlerError = RepositoryError::NotFound("ORD-1".into()).into();
        assert!(!not_found.is_retryable());

        let conflict: HandlerError = UpdateError::Repository(RepositoryError::Conflict {
            id: "ORD-1".into(),
            expected: 3,
        })
        .into();
        assert!(conflict.is_retryable());

        let domain: HandlerError =
            UpdateError::Domain(OrderError::NotCancellable(OrderStatus::Shipped)).into();
        assert!(!domain.is_retryable());

        let payload: HandlerError = serde_json::from_str::<u32>("\"x\"").unwrap_err().into();
        assert!(!payload.is_retryable());
    }
}

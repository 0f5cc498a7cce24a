use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::db::repository::OrderAccess;
use crate::handlers::{HandlerError, JobHandler};
use crate::models::job::{InventoryPayload, Job, TaskType};
use crate::services::integrations::InventoryStore;

/// Decrements stock for every line item of the order.
pub struct InventoryUpdateHandler {
    inventory: Arc<dyn InventoryStore>,
}

impl InventoryUpdateHandler {
    pub fn new(inventory: Arc<dyn InventoryStore>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl JobHandler for InventoryUpdateHandler {
    fn task_type(&self) -> TaskType {
        TaskType::InventoryUpdate
    }

    async fn execute(&self, job: &Job, _orders: &OrderAccess) -> Result<(), HandlerError> {
        let payload: InventoryPayload = job.decode()?;
        info!(
            order_id = %payload.order_id,
            items = payload.items.len(),
            "Updating inventory"
        );

        // Lines already applied are skipped by the store, so a retry after a
        // partial failure only touches the remaining lines.
        for (line, item) in payload.items.iter().enumerate() {
            self.inventory
                .decrement(&payload.order_id, line, &item.product_id, item.quantity)
                .await
                .map_err(|e| {
                    HandlerError::Retryable(format!(
                        "failed to update inventory for product {}: {}",
                        item.product_id, e
                    ))
                })?;
            debug!(
                order_id = %payload.order_id,
                line,
                product_id = %item.product_id,
                quantity = item.quantity,
                "Stock decremented"
            );
        }

        info!(order_id = %payload.order_id, "All items updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::db::repository::InMemoryOrderRepository;
    use crate::models::job::InventoryItem;
    use crate::services::integrations::InMemoryInventory;

    fn line(product_id: &str, quantity: u32) -> InventoryItem {
        InventoryItem {
            product_id: product_id.into(),
            quantity,
        }
    }

    #[tokio::test]
    async fn test_repeated_product_lines_all_decrement() {
        let inventory = Arc::new(InMemoryInventory::new(Duration::ZERO));
        inventory.seed("sku-1", 10).await;
        inventory.seed("sku-2", 4).await;
        let handler = InventoryUpdateHandler::new(inventory.clone());
        let orders = OrderAccess::new(Arc::new(InMemoryOrderRepository::new()));
        let payload = InventoryPayload {
            order_id: "ORD-0000abcd".into(),
            items: vec![line("sku-1", 2), line("sku-2", 1), line("sku-1", 3)],
        };
        let job = Job::for_task(TaskType::InventoryUpdate, &payload).unwrap();

        handler.execute(&job, &orders).await.unwrap();
        assert_eq!(inventory.level("sku-1").await, Some(5));
        assert_eq!(inventory.level("sku-2").await, Some(3));

        // Redelivery leaves stock alone.
        handler.execute(&job, &orders).await.unwrap();
        assert_eq!(inventory.level("sku-1").await, Some(5));
    }
}

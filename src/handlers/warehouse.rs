use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::db::repository::OrderAccess;
use crate::handlers::{HandlerError, JobHandler};
use crate::models::job::{Job, TaskType, WarehousePayload};
use crate::models::order::OrderStatus;
use crate::services::integrations::{TrackingNumberGenerator, WarehouseClient};

/// Hands the order to the fulfillment system, assigns a tracking number and
/// marks the order shipped.
pub struct WarehouseNotifyHandler {
    warehouse: Arc<dyn WarehouseClient>,
    tracking: Arc<dyn TrackingNumberGenerator>,
}

impl WarehouseNotifyHandler {
    pub fn new(
        warehouse: Arc<dyn WarehouseClient>,
        tracking: Arc<dyn TrackingNumberGenerator>,
    ) -> Self {
        Self { warehouse, tracking }
    }
}

#[async_trait]
impl JobHandler for WarehouseNotifyHandler {
    fn task_type(&self) -> TaskType {
        TaskType::WarehouseNotify
    }

    async fn execute(&self, job: &Job, orders: &OrderAccess) -> Result<(), HandlerError> {
        let payload: WarehousePayload = job.decode()?;
        let order_id = payload.order_id.as_str();

        let order = orders.get(order_id).await?;
        match order.status {
            OrderStatus::Shipped | OrderStatus::Delivered if order.tracking_number.is_some() => {
                info!(order_id, "Order already shipped, skipping");
                return Ok(());
            }
            OrderStatus::Confirmed | OrderStatus::Processing => {}
            // Payment may still succeed on a later attempt.
            OrderStatus::Pending | OrderStatus::PaymentProcessing | OrderStatus::PaymentFailed => {
                return Err(HandlerError::Retryable(format!(
                    "order {} is awaiting payment confirmation ({})",
                    order_id, order.status
                )));
            }
            status => {
                return Err(HandlerError::Permanent(format!(
                    "order {} cannot be shipped in status {}",
                    order_id, status
                )));
            }
        }

        info!(
            order_id,
            items = payload.item_count,
            shipping_speed = %payload.shipping_speed,
            "Notifying warehouse"
        );
        self.warehouse
            .notify(&payload)
            .await
            .map_err(|e| HandlerError::Retryable(format!("failed to notify warehouse: {}", e)))?;

        // Keep a number assigned by an earlier delivery of this job. Drawn once
        // here since the update closure is replayed on conflicts.
        let tracking_number = order
            .tracking_number
            .clone()
            .unwrap_or_else(|| self.tracking.next(&order.id));
        let stored = orders
            .update(order_id, |o| {
                if o.tracking_number.is_none() {
                    o.tracking_number = Some(tracking_number.clone());
                }
                if o.status == OrderStatus::Confirmed {
                    o.transition_to(OrderStatus::Processing)?;
                }
                o.transition_to(OrderStatus::Shipped)
            })
            .await?;

        info!(
            order_id,
            tracking_number = stored.tracking_number.as_deref().unwrap_or_default(),
            "Order shipped"
        );
        Ok(())
    }
}

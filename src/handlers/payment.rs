use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::db::repository::OrderAccess;
use crate::handlers::{HandlerError, JobHandler};
use crate::models::job::{Job, PaymentPayload, TaskType};
use crate::models::order::{Order, OrderError, OrderStatus, PaymentStatus};
use crate::services::integrations::PaymentGateway;

/// Amounts closer than this are the same charge.
const AMOUNT_TOLERANCE: f64 = 0.005;

/// Records a charge outcome, entering processing first when the earlier
/// processing marker was never stored.
fn settle(order: &mut Order, outcome: PaymentStatus) -> Result<(), OrderError> {
    if order.payment_status != PaymentStatus::Processing && order.payment_status != outcome {
        order.set_payment_status(PaymentStatus::Processing)?;
    }
    order.set_payment_status(outcome)
}

/// Captures payment and moves the order to confirmed or payment_failed.
pub struct PaymentProcessHandler {
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentProcessHandler {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl JobHandler for PaymentProcessHandler {
    fn task_type(&self) -> TaskType {
        TaskType::PaymentProcess
    }

    async fn execute(&self, job: &Job, orders: &OrderAccess) -> Result<(), HandlerError> {
        let payload: PaymentPayload = job.decode()?;
        let order_id = payload.order_id.as_str();

        let order = orders.get(order_id).await?;
        if order.payment_status == PaymentStatus::Completed {
            info!(order_id, "Payment already captured, skipping");
            return Ok(());
        }
        if order.status == OrderStatus::Cancelled {
            info!(order_id, "Order cancelled before payment, skipping");
            return Ok(());
        }
        if (order.total_amount - payload.amount).abs() > AMOUNT_TOLERANCE {
            return Err(HandlerError::Permanent(format!(
                "payment amount {:.2} does not match order total {:.2}",
                payload.amount, order.total_amount
            )));
        }

        // Best effort: the charge proceeds even if this marker is not stored.
        if let Err(e) = orders
            .update(order_id, |o| o.set_payment_status(PaymentStatus::Processing))
            .await
        {
            warn!(order_id, error = %e, "Failed to mark payment as processing");
        }

        info!(
            order_id,
            amount = payload.amount,
            method = %payload.payment_method,
            attempt = job.attempt(),
            "Processing payment"
        );

        match self.gateway.charge(&payload).await {
            Ok(transaction_id) => {
                orders
                    .update(order_id, |o| settle(o, PaymentStatus::Completed))
                    .await?;
                info!(
                    order_id,
                    transaction_id = %transaction_id,
                    "Payment captured, order confirmed"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(update_err) = orders
                    .update(order_id, |o| settle(o, PaymentStatus::Failed))
                    .await
                {
                    warn!(order_id, error = %update_err, "Failed to record payment failure");
                }
                Err(HandlerError::Retryable(format!(
                    "payment failed for order {}: {}",
                    order_id, e
                )))
            }
        }
    }
}

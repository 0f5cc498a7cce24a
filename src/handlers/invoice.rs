use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::db::repository::OrderAccess;
use crate::handlers::{HandlerError, JobHandler};
use crate::models::job::{InvoicePayload, Job, TaskType};
use crate::services::integrations::InvoiceRenderer;

/// Renders the invoice document and attaches its URL to the order.
pub struct InvoiceGenerateHandler {
    renderer: Arc<dyn InvoiceRenderer>,
}

impl InvoiceGenerateHandler {
    pub fn new(renderer: Arc<dyn InvoiceRenderer>) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl JobHandler for InvoiceGenerateHandler {
    fn task_type(&self) -> TaskType {
        TaskType::InvoiceGenerate
    }

    async fn execute(&self, job: &Job, orders: &OrderAccess) -> Result<(), HandlerError> {
        let payload: InvoicePayload = job.decode()?;

        let url = self
            .renderer
            .render(&payload)
            .await
            .map_err(|e| HandlerError::Retryable(format!("failed to generate invoice: {}", e)))?;

        orders
            .update(&payload.order_id, |o| {
                o.attach_invoice(url.clone());
                Ok(())
            })
            .await?;

        info!(order_id = %payload.order_id, invoice_url = %url, "Invoice generated");
        Ok(())
    }
}

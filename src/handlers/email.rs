use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::db::repository::OrderAccess;
use crate::handlers::{HandlerError, JobHandler};
use crate::models::job::{EmailPayload, Job, TaskType};
use crate::services::integrations::EmailSender;

pub struct EmailConfirmationHandler {
    sender: Arc<dyn EmailSender>,
}

impl EmailConfirmationHandler {
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl JobHandler for EmailConfirmationHandler {
    fn task_type(&self) -> TaskType {
        TaskType::EmailConfirmation
    }

    async fn execute(&self, job: &Job, _orders: &OrderAccess) -> Result<(), HandlerError> {
        let payload: EmailPayload = job.decode()?;

        self.sender
            .send_confirmation(&payload)
            .await
            .map_err(|e| HandlerError::Retryable(format!("failed to send email: {}", e)))?;

        info!(
            order_id = %payload.order_id,
            recipient = %payload.customer_email,
            "Confirmation email sent"
        );
        Ok(())
    }
}

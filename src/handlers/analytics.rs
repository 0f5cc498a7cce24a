use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::db::repository::OrderAccess;
use crate::handlers::{HandlerError, JobHandler};
use crate::models::job::{AnalyticsPayload, Job, TaskType};
use crate::services::integrations::AnalyticsSink;

/// Records the order event. Sink failures are logged and swallowed.
pub struct AnalyticsTrackHandler {
    sink: Arc<dyn AnalyticsSink>,
}

impl AnalyticsTrackHandler {
    pub fn new(sink: Arc<dyn AnalyticsSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl JobHandler for AnalyticsTrackHandler {
    fn task_type(&self) -> TaskType {
        TaskType::AnalyticsTrack
    }

    async fn execute(&self, job: &Job, _orders: &OrderAccess) -> Result<(), HandlerError> {
        let payload: AnalyticsPayload = job.decode()?;

        match self.sink.track(&payload).await {
            Ok(()) => info!(
                order_id = %payload.order_id,
                customer_id = %payload.customer_id,
                total_amount = payload.total_amount,
                item_count = payload.item_count,
                "Order event tracked"
            ),
            Err(e) => warn!(
                order_id = %payload.order_id,
                error = %e,
                "Analytics tracking failed, ignoring"
            ),
        }
        Ok(())
    }
}

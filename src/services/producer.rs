use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;

use crate::models::job::{
    AnalyticsPayload, EmailPayload, InventoryPayload, InvoicePayload, Job, PaymentPayload, TaskType,
    WarehousePayload,
};
use crate::models::order::Order;
use crate::services::queue::{Broker, QueueError};

/// Which of an order's jobs made it into the broker.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub submitted: Vec<TaskType>,
    pub failed: Vec<TaskType>,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Turns a stored order into its six fulfillment jobs.
#[derive(Clone)]
pub struct TaskProducer {
    broker: Arc<dyn Broker>,
}

impl TaskProducer {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Submit a single job with explicit options.
    pub async fn submit(&self, job: Job) -> Result<(), QueueError> {
        let delay = job.options.delay;
        self.broker.submit(job, delay).await
    }

    /// Submit every job for `order`. Each submission is independent: a failure
    /// is logged and reported, never returned.
    pub async fn dispatch_order(&self, order: &Order) -> DispatchReport {
        let jobs = vec![
            build(TaskType::PaymentProcess, &PaymentPayload::from_order(order)),
            build(TaskType::InventoryUpdate, &InventoryPayload::from_order(order)),
            build(TaskType::EmailConfirmation, &EmailPayload::from_order(order)),
            build(TaskType::InvoiceGenerate, &InvoicePayload::from_order(order)),
            build(TaskType::AnalyticsTrack, &AnalyticsPayload::from_order(order)),
            build(TaskType::WarehouseNotify, &WarehousePayload::from_order(order)),
        ];

        let submissions = jobs.into_iter().map(|(task_type, job)| async move {
            let result = match job {
                Ok(job) => self.submit(job).await,
                Err(e) => Err(QueueError::Serialize(e)),
            };
            (task_type, result)
        });

        let mut report = DispatchReport::default();
        for (task_type, result) in join_all(submissions).await {
            match result {
                Ok(()) => {
                    metrics::counter!(
                        "order_jobs_submitted_total",
                        "task_type" => task_type.to_string()
                    )
                    .increment(1);
                    report.submitted.push(task_type);
                }
                Err(e) => {
                    tracing::error!(
                        order_id = %order.id,
                        task_type = %task_type,
                        error = %e,
                        "Failed to enqueue job"
                    );
                    report.failed.push(task_type);
                }
            }
        }

        tracing::info!(
            order_id = %order.id,
            submitted = report.submitted.len(),
            failed = report.failed.len(),
            "Order jobs dispatched"
        );
        report
    }
}

fn build<P: Serialize>(
    task_type: TaskType,
    payload: &P,
) -> (TaskType, Result<Job, serde_json::Error>) {
    (task_type, Job::for_task(task_type, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::Priority;
    use crate::models::order::{Address, OrderItem};
    use crate::services::queue::InMemoryBroker;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Mutex;

    fn sample_order() -> Order {
        Order::new(
            "ORD-0000abcd".to_string(),
            "cust-1".to_string(),
            "buyer@example.com".to_string(),
            vec![
                OrderItem::new("sku-1", "Keyboard", 1, 100.0),
                OrderItem::new("sku-2", "Mouse", 2, 25.0),
            ],
            Address::default(),
            "credit_card".to_string(),
            String::new(),
        )
    }

    /// Broker that records submissions and refuses one task type.
    struct RecordingBroker {
        reject: TaskType,
        accepted: Mutex<Vec<(Job, Duration)>>,
    }

    #[async_trait]
    impl Broker for RecordingBroker {
        async fn submit(&self, job: Job, delay: Duration) -> Result<(), QueueError> {
            if job.task_type == self.reject.to_string() {
                return Err(QueueError::Serialize(
                    serde_json::from_str::<u8>("broker down").unwrap_err(),
                ));
            }
            self.accepted.lock().await.push((job, delay));
            Ok(())
        }

        async fn take(&self) -> Job {
            std::future::pending().await
        }

        async fn pending(&self) -> Result<u64, QueueError> {
            Ok(self.accepted.lock().await.len() as u64)
        }
    }

    #[tokio::test]
    async fn test_dispatch_submits_six_jobs() {
        let producer = TaskProducer::new(Arc::new(InMemoryBroker::default()));
        let report = producer.dispatch_order(&sample_order()).await;
        assert!(report.is_complete());
        assert_eq!(report.submitted, TaskType::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_failed_submission_is_isolated() {
        let broker = Arc::new(RecordingBroker {
            reject: TaskType::PaymentProcess,
            accepted: Mutex::new(Vec::new()),
        });
        let producer = TaskProducer::new(broker.clone());
        let report = producer.dispatch_order(&sample_order()).await;
        assert_eq!(report.failed, vec![TaskType::PaymentProcess]);
        assert_eq!(report.submitted.len(), 5);

        let accepted = broker.accepted.lock().await;
        for (job, delay) in accepted.iter() {
            let task_type: TaskType = job.task_type.parse().unwrap();
            assert_eq!(job.options, task_type.default_options());
            assert_eq!(*delay, task_type.default_options().delay);
        }

        let warehouse = accepted
            .iter()
            .find(|(job, _)| job.task_type == "warehouse:notify")
            .map(|(job, _)| job.decode::<WarehousePayload>().unwrap())
            .unwrap();
        assert_eq!(warehouse.item_count, 3);
        assert_eq!(warehouse.order_id, "ORD-0000abcd");
    }

    #[tokio::test]
    async fn test_payment_payload_carries_total() {
        let broker = Arc::new(InMemoryBroker::default());
        let producer = TaskProducer::new(broker.clone());
        producer.dispatch_order(&sample_order()).await;
        assert_eq!(broker.pending().await.unwrap(), 6);

        let payload = PaymentPayload::from_order(&sample_order());
        let job = Job::for_task(TaskType::PaymentProcess, &payload).unwrap();
        assert_eq!(job.priority(), Priority::Critical);
        let payload: PaymentPayload = job.decode().unwrap();
        assert_eq!(payload.amount, 150.0);
        assert_eq!(payload.payment_method, "credit_card");
    }
}

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::order::{Address, Order};

/// Queue priority class, highest first.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Default,
    Low,
}

impl Priority {
    /// All classes in service order.
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Default,
        Priority::Low,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Task-type tag carried by every job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
pub enum TaskType {
    #[serde(rename = "payment:process")]
    #[strum(serialize = "payment:process")]
    PaymentProcess,

    #[serde(rename = "inventory:update")]
    #[strum(serialize = "inventory:update")]
    InventoryUpdate,

    #[serde(rename = "email:confirmation")]
    #[strum(serialize = "email:confirmation")]
    EmailConfirmation,

    #[serde(rename = "invoice:generate")]
    #[strum(serialize = "invoice:generate")]
    InvoiceGenerate,

    #[serde(rename = "analytics:track")]
    #[strum(serialize = "analytics:track")]
    AnalyticsTrack,

    #[serde(rename = "warehouse:notify")]
    #[strum(serialize = "warehouse:notify")]
    WarehouseNotify,
}

impl TaskType {
    pub const ALL: [TaskType; 6] = [
        TaskType::PaymentProcess,
        TaskType::InventoryUpdate,
        TaskType::EmailConfirmation,
        TaskType::InvoiceGenerate,
        TaskType::AnalyticsTrack,
        TaskType::WarehouseNotify,
    ];

    /// Queue, retry, timeout and delay settings each task is submitted with.
    pub fn default_options(self) -> JobOptions {
        let (priority, max_retries, timeout_secs, delay_secs) = match self {
            TaskType::PaymentProcess => (Priority::Critical, 3, 30, 2),
            TaskType::InventoryUpdate => (Priority::High, 3, 15, 1),
            TaskType::EmailConfirmation => (Priority::Default, 5, 20, 3),
            TaskType::InvoiceGenerate => (Priority::Default, 3, 60, 5),
            TaskType::AnalyticsTrack => (Priority::Low, 2, 10, 10),
            TaskType::WarehouseNotify => (Priority::Low, 3, 15, 5),
        };
        JobOptions {
            priority,
            max_retries,
            timeout: Duration::from_secs(timeout_secs),
            delay: Duration::from_secs(delay_secs),
        }
    }
}

/// Submission options for a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobOptions {
    pub priority: Priority,
    pub max_retries: u32,
    pub timeout: Duration,
    /// Initial delay before the first attempt becomes eligible.
    pub delay: Duration,
}

/// Envelope moved through the broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: Uuid,
    /// Kept as the raw tag so jobs with unknown types can still be dequeued and rejected.
    pub task_type: String,
    pub payload: serde_json::Value,
    pub options: JobOptions,
    /// Number of retries already scheduled for this job.
    #[serde(default)]
    pub retried: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        task_type: impl Into<String>,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.into(),
            payload,
            options,
            retried: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// Build a job for a known task type with its standard options.
    pub fn for_task<P: Serialize>(
        task_type: TaskType,
        payload: &P,
    ) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_value(payload)?;
        Ok(Self::new(task_type.to_string(), payload, task_type.default_options()))
    }

    pub fn priority(&self) -> Priority {
        self.options.priority
    }

    /// 1-based number of the attempt currently being executed.
    pub fn attempt(&self) -> u32 {
        self.retried + 1
    }

    pub fn decode<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentPayload {
    pub order_id: String,
    pub amount: f64,
    pub payment_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryPayload {
    pub order_id: String,
    pub items: Vec<InventoryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailPayload {
    pub order_id: String,
    pub customer_email: String,
    pub customer_name: String,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoicePayload {
    pub order_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsPayload {
    pub order_id: String,
    pub customer_id: String,
    pub total_amount: f64,
    pub item_count: u32,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WarehousePayload {
    pub order_id: String,
    pub customer_name: String,
    pub shipping_address: Address,
    pub item_count: u32,
    /// standard, express or overnight
    pub shipping_speed: String,
}

impl PaymentPayload {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            amount: order.total_amount,
            payment_method: order.payment_method.clone(),
        }
    }
}

impl InventoryPayload {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            items: order
                .items
                .iter()
                .map(|item| InventoryItem {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                })
                .collect(),
        }
    }
}

impl EmailPayload {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            customer_email: order.customer_email.clone(),
            customer_name: order.customer_id.clone(),
            total_amount: order.total_amount,
        }
    }
}

impl InvoicePayload {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            customer_name: order.customer_id.clone(),
            customer_email: order.customer_email.clone(),
            total_amount: order.total_amount,
        }
    }
}

impl AnalyticsPayload {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            customer_id: order.customer_id.clone(),
            total_amount: order.total_amount,
            item_count: order.item_count(),
            payment_method: order.payment_method.clone(),
            created_at: order.created_at,
        }
    }
}

impl WarehousePayload {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            customer_name: order.customer_id.clone(),
            shipping_address: order.shipping_address.clone(),
            item_count: order.item_count(),
            shipping_speed: "standard".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_table() {
        let payment = TaskType::PaymentProcess.default_options();
        assert_eq!(payment.priority, Priority::Critical);
        assert_eq!(payment.max_retries, 3);
        assert_eq!(payment.timeout, Duration::from_secs(30));
        assert_eq!(payment.delay, Duration::from_secs(2));

        let email = TaskType::EmailConfirmation.default_options();
        assert_eq!(email.priority, Priority::Default);
        assert_eq!(email.max_retries, 5);

        let analytics = TaskType::AnalyticsTrack.default_options();
        assert_eq!(analytics.priority, Priority::Low);
        assert_eq!(analytics.max_retries, 2);
        assert_eq!(analytics.delay, Duration::from_secs(10));

        let warehouse = TaskType::WarehouseNotify.default_options();
        assert_eq!(warehouse.priority, Priority::Low);
        assert_eq!(warehouse.timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_task_type_tags() {
        for task in TaskType::ALL {
            let tag = task.to_string();
            assert_eq!(tag.parse::<TaskType>().unwrap(), task);
            assert_eq!(serde_json::to_value(task).unwrap(), serde_json::json!(tag));
        }
        assert_eq!(TaskType::InvoiceGenerate.to_string(), "invoice:generate");
        assert!("refund:process".parse::<TaskType>().is_err());
    }

    #[test]
    fn test_priority_order() {
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::Default < Priority::Low);
        assert_eq!(Priority::ALL.map(Priority::index), [0, 1, 2, 3]);
        assert_eq!("default".parse::<Priority>().unwrap(), Priority::Default);
    }

    #[test]
    fn test_decode_rejects_wrong_payload() {
        let job = Job::new(
            TaskType::PaymentProcess.to_string(),
            serde_json::json!({ "order_id": 42 }),
            TaskType::PaymentProcess.default_options(),
        );
        assert!(job.decode::<PaymentPayload>().is_err());
        assert_eq!(job.attempt(), 1);
    }
}

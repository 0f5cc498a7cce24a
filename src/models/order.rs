use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    PaymentProcessing,
    PaymentFailed,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Pending,
        OrderStatus::PaymentProcessing,
        OrderStatus::PaymentFailed,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Whether a user may still cancel an order in this status.
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::PaymentProcessing | OrderStatus::Confirmed
        )
    }

    /// Allowed edges of the order state machine.
    ///
    /// `PaymentFailed -> PaymentProcessing` is only taken when the payment job
    /// comes back for another attempt; nothing else leaves `PaymentFailed`.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, PaymentProcessing) => true,
            (PaymentProcessing, Confirmed) | (PaymentProcessing, PaymentFailed) => true,
            (PaymentFailed, PaymentProcessing) => true,
            (Confirmed, Processing) => true,
            (Processing, Shipped) => true,
            (Shipped, Delivered) => true,
            (from, Cancelled) => from.is_cancellable(),
            _ => false,
        }
    }
}

/// Payment state, tracked independently from the order status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Processing)
                | (Completed, Refunded)
        )
    }

    /// Order status implied by reaching this payment status, if any.
    fn drives(self) -> Option<OrderStatus> {
        match self {
            PaymentStatus::Processing => Some(OrderStatus::PaymentProcessing),
            PaymentStatus::Completed => Some(OrderStatus::Confirmed),
            PaymentStatus::Failed => Some(OrderStatus::PaymentFailed),
            PaymentStatus::Pending | PaymentStatus::Refunded => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub subtotal: f64,
}

impl OrderItem {
    pub fn new(product_id: &str, product_name: &str, quantity: u32, unit_price: f64) -> Self {
        Self {
            product_id: product_id.to_string(),
            product_name: product_name.to_string(),
            quantity,
            unit_price,
            subtotal: unit_price * f64::from(quantity),
        }
    }
}

/// Shipping address.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, PartialEq)]
pub struct Address {
    #[garde(length(min = 1, max = 200))]
    pub street: String,

    #[garde(length(min = 1, max = 100))]
    pub city: String,

    #[garde(skip)]
    #[serde(default)]
    pub state: String,

    #[garde(skip)]
    #[serde(default)]
    pub postal_code: String,

    #[garde(length(min = 2, max = 100))]
    pub country: String,
}

/// An e-commerce order. Handlers only ever hold a copy of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    pub customer_email: String,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub shipping_address: Address,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped by the repository on every update.
    #[serde(default)]
    pub version: i64,
}

impl Order {
    /// Build a new pending order; the total is the sum of the item subtotals.
    pub fn new(
        id: String,
        customer_id: String,
        customer_email: String,
        items: Vec<OrderItem>,
        shipping_address: Address,
        payment_method: String,
        notes: String,
    ) -> Self {
        let now = Utc::now();
        let total_amount = items.iter().map(|item| item.subtotal).sum();
        Self {
            id,
            customer_id,
            customer_email,
            items,
            total_amount,
            shipping_address,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method,
            invoice_url: None,
            tracking_number: None,
            notes,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn calculate_total(&self) -> f64 {
        self.items.iter().map(|item| item.subtotal).sum()
    }

    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Move to `next` if the state machine allows it. Re-entering the current
    /// status is a no-op so redelivered jobs stay harmless.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Record a payment status change together with the order status it drives.
    pub fn set_payment_status(&mut self, next: PaymentStatus) -> Result<(), OrderError> {
        if self.payment_status == next {
            return Ok(());
        }
        if !self.payment_status.can_transition_to(next) {
            return Err(OrderError::InvalidPaymentTransition {
                from: self.payment_status,
                to: next,
            });
        }
        if let Some(status) = next.drives() {
            if self.status != status && !self.status.can_transition_to(status) {
                return Err(OrderError::InvalidTransition {
                    from: self.status,
                    to: status,
                });
            }
            self.status = status;
        }
        self.payment_status = next;
        self.touch();
        Ok(())
    }

    /// User-requested cancellation.
    pub fn cancel(&mut self, reason: &str) -> Result<(), OrderError> {
        if !self.status.is_cancellable() {
            return Err(OrderError::NotCancellable(self.status));
        }
        self.status = OrderStatus::Cancelled;
        self.notes = format!("Cancelled: {}", reason);
        self.touch();
        Ok(())
    }

    pub fn attach_invoice(&mut self, url: String) {
        if self.invoice_url.as_deref() != Some(url.as_str()) {
            self.invoice_url = Some(url);
            self.touch();
        }
    }
}

/// Domain guard violations, reported to whoever attempted the mutation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("cannot cancel order in current state: {0}")]
    NotCancellable(OrderStatus),

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("invalid payment status transition from {from} to {to}")]
    InvalidPaymentTransition { from: PaymentStatus, to: PaymentStatus },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order::new(
            "ORD-12345678".to_string(),
            "cust-1".to_string(),
            "buyer@example.com".to_string(),
            vec![
                OrderItem::new("sku-1", "Keyboard", 2, 50.0),
                OrderItem::new("sku-2", "Mouse", 1, 50.0),
            ],
            Address::default(),
            "credit_card".to_string(),
            String::new(),
        )
    }

    #[test]
    fn test_total_is_sum_of_subtotals() {
        let order = sample_order();
        assert_eq!(order.items[0].subtotal, 100.0);
        assert_eq!(order.total_amount, 150.0);
        assert_eq!(order.total_amount, order.calculate_total());
        assert_eq!(order.item_count(), 3);
    }

    #[test]
    fn test_cancel_allowed_only_in_cancellable_states() {
        for status in OrderStatus::ALL {
            let mut order = sample_order();
            order.status = status;
            let before = order.clone();

            let result = order.cancel("changed my mind");
            if matches!(
                status,
                OrderStatus::Pending | OrderStatus::PaymentProcessing | OrderStatus::Confirmed
            ) {
                assert!(result.is_ok(), "cancel should succeed from {status}");
                assert_eq!(order.status, OrderStatus::Cancelled);
                assert_eq!(order.notes, "Cancelled: changed my mind");
            } else {
                assert_eq!(result, Err(OrderError::NotCancellable(status)));
                assert_eq!(order, before, "failed cancel must not change the order");
            }
        }
    }

    #[test]
    fn test_cancel_shipped_reports_guard_violation() {
        let mut order = sample_order();
        order.status = OrderStatus::Shipped;
        let err = order.cancel("too late").unwrap_err();
        assert!(err.to_string().contains("cannot cancel"));
    }

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(PaymentProcessing));
        assert!(PaymentProcessing.can_transition_to(Confirmed));
        assert!(PaymentProcessing.can_transition_to(PaymentFailed));
        assert!(Confirmed.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));

        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Confirmed.can_transition_to(Shipped));
        assert!(!Processing.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Shipped));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!PaymentFailed.can_transition_to(Confirmed));
    }

    #[test]
    fn test_transition_updates_timestamp() {
        let mut order = sample_order();
        let before = order.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        order.transition_to(OrderStatus::PaymentProcessing).unwrap();
        assert!(order.updated_at > before);
    }

    #[test]
    fn test_invalid_transition_leaves_order_unchanged() {
        let mut order = sample_order();
        let before = order.clone();
        let err = order.transition_to(OrderStatus::Shipped).unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Shipped
            }
        );
        assert_eq!(order, before);
    }

    #[test]
    fn test_payment_status_drives_order_status() {
        let mut order = sample_order();
        order.set_payment_status(PaymentStatus::Processing).unwrap();
        assert_eq!(order.status, OrderStatus::PaymentProcessing);

        order.set_payment_status(PaymentStatus::Completed).unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.payment_status, PaymentStatus::Completed);
    }

    #[test]
    fn test_payment_failure_and_retry_reentry() {
        let mut order = sample_order();
        order.set_payment_status(PaymentStatus::Processing).unwrap();
        order.set_payment_status(PaymentStatus::Failed).unwrap();
        assert_eq!(order.status, OrderStatus::PaymentFailed);

        order.set_payment_status(PaymentStatus::Processing).unwrap();
        assert_eq!(order.status, OrderStatus::PaymentProcessing);
    }

    #[test]
    fn test_payment_cannot_confirm_cancelled_order() {
        let mut order = sample_order();
        order.set_payment_status(PaymentStatus::Processing).unwrap();
        order.cancel("duplicate").unwrap();
        let before = order.clone();

        assert!(order.set_payment_status(PaymentStatus::Completed).is_err());
        assert_eq!(order, before);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(OrderStatus::PaymentProcessing.to_string(), "payment_processing");
        assert_eq!("payment_failed".parse::<OrderStatus>().unwrap(), OrderStatus::PaymentFailed);
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Completed).unwrap(),
            "\"completed\""
        );
    }
}

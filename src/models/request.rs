use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::order::{Address, Order, OrderStatus, PaymentStatus};

/// Body of `POST /api/v1/orders`.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateOrderRequest {
    #[garde(length(min = 1, max = 100))]
    pub customer_id: String,

    #[garde(email)]
    pub customer_email: String,

    #[garde(length(min = 1, max = 100), dive)]
    pub items: Vec<CreateOrderItem>,

    #[garde(dive)]
    pub shipping_address: Address,

    #[garde(length(min = 1, max = 50))]
    pub payment_method: String,

    #[garde(skip)]
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateOrderItem {
    #[garde(length(min = 1, max = 100))]
    pub product_id: String,

    #[garde(length(max = 200))]
    #[serde(default)]
    pub product_name: String,

    #[garde(range(min = 1, max = 10_000))]
    pub quantity: u32,

    #[garde(range(min = 0.0))]
    pub unit_price: f64,
}

/// Body of `POST /api/v1/orders/{id}/cancel`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CancelOrderRequest {
    #[garde(length(max = 500))]
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub customer_id: Option<String>,
}

/// Compact status view of an order.
#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub order_id: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub tracking_number: Option<String>,
    pub invoice_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderStatusResponse {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            status: order.status,
            payment_status: order.payment_status,
            tracking_number: order.tracking_number.clone(),
            invoice_url: order.invoice_url.clone(),
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListOrdersResponse {
    pub orders: Vec<Order>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

//! External effects the job handlers drive.
//!
//! Production wiring uses the simulated implementations below; each trait is
//! the seam where a real gateway, mail provider or warehouse API plugs in.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::sleep;
use uuid::Uuid;

use crate::models::job::{
    AnalyticsPayload, EmailPayload, InvoicePayload, PaymentPayload, WarehousePayload,
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IntegrationError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: String,
        requested: u32,
        available: i64,
    },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Capture the payment; returns the gateway transaction id.
    async fn charge(&self, payment: &PaymentPayload) -> Result<String, IntegrationError>;
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Decrement stock for line `line` of an order. Repeating the same
    /// `(order_id, line)` must not decrement twice; an order may hold several
    /// lines for one product.
    async fn decrement(
        &self,
        order_id: &str,
        line: usize,
        product_id: &str,
        quantity: u32,
    ) -> Result<(), IntegrationError>;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_confirmation(&self, email: &EmailPayload) -> Result<(), IntegrationError>;
}

#[async_trait]
pub trait InvoiceRenderer: Send + Sync {
    /// Render and store the invoice, returning its public URL.
    async fn render(&self, invoice: &InvoicePayload) -> Result<String, IntegrationError>;
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn track(&self, event: &AnalyticsPayload) -> Result<(), IntegrationError>;
}

#[async_trait]
pub trait WarehouseClient: Send + Sync {
    async fn notify(&self, shipment: &WarehousePayload) -> Result<(), IntegrationError>;
}

/// Source of tracking-number suffixes.
pub trait TrackingNumberGenerator: Send + Sync {
    fn next(&self, order_id: &str) -> String;
}

fn order_suffix(order_id: &str) -> &str {
    let start = order_id
        .char_indices()
        .rev()
        .nth(3)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &order_id[start..]
}

/// `TRK-<last4>-0001`, `TRK-<last4>-0002`, ... in call order.
#[derive(Default)]
pub struct SequentialTrackingNumbers {
    counter: AtomicU64,
}

impl SequentialTrackingNumbers {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrackingNumberGenerator for SequentialTrackingNumbers {
    fn next(&self, order_id: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("TRK-{}-{:04}", order_suffix(order_id), n)
    }
}

pub struct RandomTrackingNumbers;

impl TrackingNumberGenerator for RandomTrackingNumbers {
    fn next(&self, order_id: &str) -> String {
        let token = Uuid::new_v4().simple().to_string().to_uppercase();
        format!("TRK-{}-{}", order_suffix(order_id), &token[..8])
    }
}

/// Latency applied by the simulated integrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedLatency {
    pub payment: Duration,
    /// Per line item.
    pub inventory: Duration,
    pub email: Duration,
    pub invoice: Duration,
    pub analytics: Duration,
    pub warehouse: Duration,
}

impl SimulatedLatency {
    pub fn realistic() -> Self {
        Self {
            payment: Duration::from_secs(2),
            inventory: Duration::from_millis(100),
            email: Duration::from_secs(1),
            invoice: Duration::from_secs(3),
            analytics: Duration::from_millis(200),
            warehouse: Duration::from_millis(500),
        }
    }

    pub fn none() -> Self {
        Self {
            payment: Duration::ZERO,
            inventory: Duration::ZERO,
            email: Duration::ZERO,
            invoice: Duration::ZERO,
            analytics: Duration::ZERO,
            warehouse: Duration::ZERO,
        }
    }
}

async fn pause(latency: Duration) {
    if !latency.is_zero() {
        sleep(latency).await;
    }
}

pub struct SimulatedPaymentGateway {
    latency: Duration,
}

impl SimulatedPaymentGateway {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    async fn charge(&self, payment: &PaymentPayload) -> Result<String, IntegrationError> {
        pause(self.latency).await;
        if payment.amount < 0.0 {
            return Err(IntegrationError::Rejected(format!(
                "negative amount {:.2}",
                payment.amount
            )));
        }
        Ok(format!("txn_{}", Uuid::new_v4().simple()))
    }
}

/// Stock held in memory. Products without a seeded level are untracked and
/// always accepted.
pub struct InMemoryInventory {
    latency: Duration,
    stock: Mutex<HashMap<String, i64>>,
    applied: Mutex<HashSet<(String, usize)>>,
}

impl InMemoryInventory {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            stock: Mutex::new(HashMap::new()),
            applied: Mutex::new(HashSet::new()),
        }
    }

    pub async fn seed(&self, product_id: &str, quantity: i64) {
        self.stock.lock().await.insert(product_id.to_string(), quantity);
    }

    pub async fn level(&self, product_id: &str) -> Option<i64> {
        self.stock.lock().await.get(product_id).copied()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventory {
    async fn decrement(
        &self,
        order_id: &str,
        line: usize,
        product_id: &str,
        quantity: u32,
    ) -> Result<(), IntegrationError> {
        pause(self.latency).await;

        let key = (order_id.to_string(), line);
        let mut applied = self.applied.lock().await;
        if applied.contains(&key) {
            return Ok(());
        }

        let mut stock = self.stock.lock().await;
        if let Some(available) = stock.get_mut(product_id) {
            if *available < i64::from(quantity) {
                return Err(IntegrationError::InsufficientStock {
                    product_id: product_id.to_string(),
                    requested: quantity,
                    available: *available,
                });
            }
            *available -= i64::from(quantity);
        }
        applied.insert(key);
        Ok(())
    }
}

pub struct SimulatedEmailSender {
    latency: Duration,
}

impl SimulatedEmailSender {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl EmailSender for SimulatedEmailSender {
    async fn send_confirmation(&self, email: &EmailPayload) -> Result<(), IntegrationError> {
        pause(self.latency).await;
        if !email.customer_email.contains('@') {
            return Err(IntegrationError::Rejected(format!(
                "invalid recipient {}",
                email.customer_email
            )));
        }
        Ok(())
    }
}

pub struct SimulatedInvoiceRenderer {
    latency: Duration,
    base_url: String,
}

impl SimulatedInvoiceRenderer {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            base_url: "https://storage.example.com/invoices".to_string(),
        }
    }
}

#[async_trait]
impl InvoiceRenderer for SimulatedInvoiceRenderer {
    async fn render(&self, invoice: &InvoicePayload) -> Result<String, IntegrationError> {
        pause(self.latency).await;
        Ok(format!("{}/{}.pdf", self.base_url, invoice.order_id))
    }
}

pub struct SimulatedAnalyticsSink {
    latency: Duration,
}

impl SimulatedAnalyticsSink {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl AnalyticsSink for SimulatedAnalyticsSink {
    async fn track(&self, _event: &AnalyticsPayload) -> Result<(), IntegrationError> {
        pause(self.latency).await;
        Ok(())
    }
}

pub struct SimulatedWarehouseClient {
    latency: Duration,
}

impl SimulatedWarehouseClient {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl WarehouseClient for SimulatedWarehouseClient {
    async fn notify(&self, _shipment: &WarehousePayload) -> Result<(), IntegrationError> {
        pause(self.latency).await;
        Ok(())
    }
}

/// The full set of external collaborators handed to the handler registry.
#[derive(Clone)]
pub struct Integrations {
    pub payments: Arc<dyn PaymentGateway>,
    pub inventory: Arc<dyn InventoryStore>,
    pub email: Arc<dyn EmailSender>,
    pub invoices: Arc<dyn InvoiceRenderer>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub warehouse: Arc<dyn WarehouseClient>,
    pub tracking: Arc<dyn TrackingNumberGenerator>,
}

impl Integrations {
    pub fn simulated(latency: SimulatedLatency) -> Self {
        Self {
            payments: Arc::new(SimulatedPaymentGateway::new(latency.payment)),
            inventory: Arc::new(InMemoryInventory::new(latency.inventory)),
            email: Arc::new(SimulatedEmailSender::new(latency.email)),
            invoices: Arc::new(SimulatedInvoiceRenderer::new(latency.invoice)),
            analytics: Arc::new(SimulatedAnalyticsSink::new(latency.analytics)),
            warehouse: Arc::new(SimulatedWarehouseClient::new(latency.warehouse)),
            tracking: Arc::new(RandomTrackingNumbers),
        }
    }
}

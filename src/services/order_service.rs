use std::sync::Arc;

use garde::Validate;
use uuid::Uuid;

use crate::db::repository::{OrderAccess, OrderRepository, RepositoryError, UpdateError};
use crate::models::order::{Order, OrderError, OrderItem};
use crate::models::request::CreateOrderRequest;
use crate::services::producer::TaskProducer;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid order: {0}")]
    Validation(#[from] garde::Report),

    #[error("order not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Domain(#[from] OrderError),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ServiceError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(id) => ServiceError::NotFound(id),
            other => ServiceError::Repository(other),
        }
    }
}

impl From<UpdateError> for ServiceError {
    fn from(e: UpdateError) -> Self {
        match e {
            UpdateError::Repository(e) => e.into(),
            UpdateError::Domain(e) => ServiceError::Domain(e),
        }
    }
}

/// Order lifecycle entry points used by the HTTP layer.
#[derive(Clone)]
pub struct OrderService {
    orders: OrderAccess,
    producer: TaskProducer,
}

impl OrderService {
    pub fn new(repo: Arc<dyn OrderRepository>, producer: TaskProducer) -> Self {
        Self {
            orders: OrderAccess::new(repo),
            producer,
        }
    }

    pub fn orders(&self) -> &OrderAccess {
        &self.orders
    }

    /// Validate, store and fan out the fulfillment jobs. The order is returned
    /// as stored even if some jobs could not be submitted.
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, ServiceError> {
        request.validate()?;

        let items = request
            .items
            .iter()
            .map(|item| {
                OrderItem::new(&item.product_id, &item.product_name, item.quantity, item.unit_price)
            })
            .collect();
        let order = Order::new(
            new_order_id(),
            request.customer_id,
            request.customer_email,
            items,
            request.shipping_address,
            request.payment_method,
            request.notes.unwrap_or_default(),
        );

        self.orders.repository().create(&order).await?;
        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.id,
            customer_id = %order.customer_id,
            total_amount = order.total_amount,
            "Order created"
        );

        let report = self.producer.dispatch_order(&order).await;
        if !report.is_complete() {
            tracing::warn!(
                order_id = %order.id,
                failed = ?report.failed,
                "Some fulfillment jobs were not submitted"
            );
        }
        Ok(order)
    }

    pub async fn get_order(&self, id: &str) -> Result<Order, ServiceError> {
        Ok(self.orders.get(id).await?)
    }

    /// Orders for one customer, or every order when no customer is given. Newest first.
    pub async fn list_orders(&self, customer_id: Option<&str>) -> Result<Vec<Order>, ServiceError> {
        let repo = self.orders.repository();
        let orders = match customer_id {
            Some(customer) => repo.find_by_customer(customer).await?,
            None => repo.find_all().await?,
        };
        Ok(orders)
    }

    pub async fn cancel_order(&self, id: &str, reason: &str) -> Result<Order, ServiceError> {
        let order = self.orders.update(id, |o| o.cancel(reason)).await?;
        tracing::info!(order_id = %id, reason, "Order cancelled");
        Ok(order)
    }
}

/// `ORD-` followed by the first eight hex digits of a random UUID.
fn new_order_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("ORD-{}", &uuid[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::InMemoryOrderRepository;
    use crate::models::order::{Address, OrderStatus, PaymentStatus};
    use crate::models::request::CreateOrderItem;
    use crate::services::queue::{Broker, InMemoryBroker};

    fn service() -> (OrderService, Arc<InMemoryBroker>) {
        let broker = Arc::new(InMemoryBroker::default());
        let service = OrderService::new(
            Arc::new(InMemoryOrderRepository::new()),
            TaskProducer::new(broker.clone()),
        );
        (service, broker)
    }

    fn request() -> CreateOrderRequest {
        CreateOrderRequest {
            customer_id: "cust-42".to_string(),
            customer_email: "buyer@example.com".to_string(),
            items: vec![
                CreateOrderItem {
                    product_id: "sku-1".to_string(),
                    product_name: "Keyboard".to_string(),
                    quantity: 1,
                    unit_price: 100.0,
                },
                CreateOrderItem {
                    product_id: "sku-2".to_string(),
                    product_name: "Mouse".to_string(),
                    quantity: 2,
                    unit_price: 25.0,
                },
            ],
            shipping_address: Address {
                street: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                state: "IL".to_string(),
                postal_code: "62701".to_string(),
                country: "US".to_string(),
            },
            payment_method: "credit_card".to_string(),
            notes: None,
        }
    }

    #[test]
    fn test_order_id_format() {
        let id = new_order_id();
        assert_eq!(id.len(), 12);
        assert!(id.starts_with("ORD-"));
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_create_order_stores_and_dispatches() {
        let (service, broker) = service();
        let order = service.create_order(request()).await.unwrap();

        assert_eq!(order.total_amount, 150.0);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(service.get_order(&order.id).await.unwrap().id, order.id);
        assert_eq!(broker.pending().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_create_order_rejects_invalid_request() {
        let (service, broker) = service();
        let mut bad = request();
        bad.customer_email = "not-an-email".to_string();
        bad.items.clear();

        let err = service.create_order(bad).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(broker.pending().await.unwrap(), 0);
        assert!(service.list_orders(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_orders_filters_by_customer() {
        let (service, _) = service();
        service.create_order(request()).await.unwrap();
        let mut other = request();
        other.customer_id = "cust-7".to_string();
        service.create_order(other).await.unwrap();

        assert_eq!(service.list_orders(None).await.unwrap().len(), 2);
        let mine = service.list_orders(Some("cust-42")).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].customer_id, "cust-42");
        assert!(service.list_orders(Some("nobody")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_pending_order() {
        let (service, _) = service();
        let order = service.create_order(request()).await.unwrap();

        let cancelled = service.cancel_order(&order.id, "changed my mind").await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.notes, "Cancelled: changed my mind");
    }

    #[tokio::test]
    async fn test_cancel_shipped_order_is_refused() {
        let (service, _) = service();
        let order = service.create_order(request()).await.unwrap();
        service
            .orders()
            .update(&order.id, |o| {
                o.status = OrderStatus::Shipped;
                Ok(())
            })
            .await
            .unwrap();

        let err = service.cancel_order(&order.id, "too late").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(OrderError::NotCancellable(OrderStatus::Shipped))
        ));
        assert!(err.to_string().contains("cannot cancel"));

        let stored = service.get_order(&order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Shipped);
        assert!(stored.notes.is_empty());
    }

    #[tokio::test]
    async fn test_missing_order_is_not_found() {
        let (service, _) = service();
        assert!(matches!(
            service.get_order("ORD-missing").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.cancel_order("ORD-missing", "x").await,
            Err(ServiceError::NotFound(_))
        ));
    }
}

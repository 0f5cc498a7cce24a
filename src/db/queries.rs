use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::db::repository::{OrderRepository, RepositoryError};
use crate::models::order::{Address, Order, OrderItem, OrderStatus, PaymentStatus};

const ORDER_COLUMNS: &str = r#"
    id, customer_id, customer_email, items, total_amount, shipping_address,
    status, payment_status, payment_method, invoice_url, tracking_number,
    notes, created_at, updated_at, version
"#;

/// PostgreSQL-backed order repository.
#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn order_from_row(row: &PgRow) -> Result<Order, RepositoryError> {
    let status: String = row.try_get("status")?;
    let payment_status: String = row.try_get("payment_status")?;
    let Json(items): Json<Vec<OrderItem>> = row.try_get("items")?;
    let Json(shipping_address): Json<Address> = row.try_get("shipping_address")?;

    Ok(Order {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        customer_email: row.try_get("customer_email")?,
        items,
        total_amount: row.try_get("total_amount")?,
        shipping_address,
        status: status
            .parse::<OrderStatus>()
            .map_err(|_| RepositoryError::Corrupt(format!("unknown order status '{}'", status)))?,
        payment_status: payment_status.parse::<PaymentStatus>().map_err(|_| {
            RepositoryError::Corrupt(format!("unknown payment status '{}'", payment_status))
        })?,
        payment_method: row.try_get("payment_method")?,
        invoice_url: row.try_get("invoice_url")?,
        tracking_number: row.try_get("tracking_number")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get("version")?,
    })
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create(&self, order: &Order) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, customer_email, items, total_amount,
                                shipping_address, status, payment_status, payment_method,
                                invoice_url, tracking_number, notes, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(&order.id)
        .bind(&order.customer_id)
        .bind(&order.customer_email)
        .bind(Json(&order.items))
        .bind(order.total_amount)
        .bind(Json(&order.shipping_address))
        .bind(order.status.to_string())
        .bind(order.payment_status.to_string())
        .bind(&order.payment_method)
        .bind(&order.invoice_url)
        .bind(&order.tracking_number)
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.version)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(RepositoryError::Duplicate(order.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Order, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => order_from_row(&r),
            None => Err(RepositoryError::NotFound(id.to_string())),
        }
    }

    async fn find_by_customer(&self, customer_id: &str) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM orders WHERE customer_id = $1 ORDER BY created_at DESC",
            ORDER_COLUMNS
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(order_from_row).collect()
    }

    async fn find_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM orders ORDER BY created_at DESC",
            ORDER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(order_from_row).collect()
    }

    async fn update(&self, order: &Order) -> Result<Order, RepositoryError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = $3,
                payment_status = $4,
                invoice_url = $5,
                tracking_number = $6,
                notes = $7,
                updated_at = $8,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(&order.id)
        .bind(order.version)
        .bind(order.status.to_string())
        .bind(order.payment_status.to_string())
        .bind(&order.invoice_url)
        .bind(&order.tracking_number)
        .bind(&order.notes)
        .bind(order.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(r) = row {
            return order_from_row(&r);
        }

        // Nothing matched: either the order is gone or someone else wrote first.
        let exists: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
            .bind(&order.id)
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => Err(RepositoryError::Conflict {
                id: order.id.clone(),
                expected: order.version,
            }),
            None => Err(RepositoryError::NotFound(order.id.clone())),
        }
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

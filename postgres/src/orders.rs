//! `PostgreSQL`-backed [`OrderRepository`]: idempotent create, last-write-wins
//! status transitions (spec §4.4.1).
//!
//! ```sql
//! CREATE TABLE orders (
//!     order_id    TEXT PRIMARY KEY,
//!     customer_id TEXT NOT NULL,
//!     items       JSONB NOT NULL,
//!     total       DOUBLE PRECISION NOT NULL,
//!     status      TEXT NOT NULL,
//!     created_at  TIMESTAMPTZ NOT NULL,
//!     updated_at  TIMESTAMPTZ NOT NULL
//! );
//! ```

use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use orderflow_core::envelope::LineItem;
use orderflow_core::ids::OrderId;
use orderflow_core::orders::{Order, OrderRepository, OrderRepositoryError, OrderStatus};
use sqlx::{PgPool, Row};

/// Order aggregate store backed by an `orders` table with a unique `order_id`.
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    /// Wrap `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: &sqlx::postgres::PgRow) -> Result<Order, OrderRepositoryError> {
        let status_str: String = row
            .try_get("status")
            .map_err(|e| OrderRepositoryError::Database(e.to_string()))?;
        let status = parse_status(&status_str);
        let order_id: String = row
            .try_get("order_id")
            .map_err(|e| OrderRepositoryError::Database(e.to_string()))?;
        let items: serde_json::Value = row
            .try_get("items")
            .map_err(|e| OrderRepositoryError::Database(e.to_string()))?;
        let items: Vec<LineItem> = serde_json::from_value(items)
            .map_err(|e| OrderRepositoryError::Database(e.to_string()))?;
        Ok(Order {
            order_id: order_id.into(),
            customer_id: row
                .try_get("customer_id")
                .map_err(|e| OrderRepositoryError::Database(e.to_string()))?,
            items,
            total: row
                .try_get("total")
                .map_err(|e| OrderRepositoryError::Database(e.to_string()))?,
            status,
            created_at: row
                .try_get("created_at")
                .map_err(|e| OrderRepositoryError::Database(e.to_string()))?,
            updated_at: row
                .try_get("updated_at")
                .map_err(|e| OrderRepositoryError::Database(e.to_string()))?,
        })
    }
}

fn status_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "PENDING",
        OrderStatus::Confirmed => "CONFIRMED",
        OrderStatus::Rejected => "REJECTED",
        OrderStatus::Cancelled => "CANCELLED",
    }
}

fn parse_status(s: &str) -> OrderStatus {
    match s {
        "CONFIRMED" => OrderStatus::Confirmed,
        "REJECTED" => OrderStatus::Rejected,
        "CANCELLED" => OrderStatus::Cancelled,
        _ => OrderStatus::Pending,
    }
}

impl OrderRepository for PgOrderRepository {
    fn create<'a>(
        &'a self,
        order_id: &'a OrderId,
        customer_id: &'a str,
        items: &'a [LineItem],
        total: f64,
    ) -> Pin<Box<dyn Future<Output = Result<Order, OrderRepositoryError>> + Send + 'a>> {
        Box::pin(async move {
            let now = Utc::now();
            let items_json = serde_json::to_value(items)
                .map_err(|e| OrderRepositoryError::Database(e.to_string()))?;

            sqlx::query(
                r"
                INSERT INTO orders (order_id, customer_id, items, total, status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, 'PENDING', $5, $5)
                ON CONFLICT (order_id) DO NOTHING
                ",
            )
            .bind(order_id.as_str())
            .bind(customer_id)
            .bind(&items_json)
            .bind(total)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| OrderRepositoryError::Database(e.to_string()))?;

            // Whether this call inserted the row or lost the race to a concurrent
            // create, the caller always gets back whatever is actually stored
            // (spec §4.4.1 step 3: duplicate order_id returns the existing row).
            let row = sqlx::query(
                r"
                SELECT order_id, customer_id, items, total, status, created_at, updated_at
                FROM orders WHERE order_id = $1
                ",
            )
            .bind(order_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| OrderRepositoryError::Database(e.to_string()))?;

            Self::row_to_order(&row)
        })
    }

    fn find<'a>(
        &'a self,
        order_id: &'a OrderId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Order>, OrderRepositoryError>> + Send + 'a>>
    {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT order_id, customer_id, items, total, status, created_at, updated_at
                FROM orders WHERE order_id = $1
                ",
            )
            .bind(order_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| OrderRepositoryError::Database(e.to_string()))?;

            row.as_ref().map(Self::row_to_order).transpose()
        })
    }

    fn update_status<'a>(
        &'a self,
        order_id: &'a OrderId,
        status: OrderStatus,
    ) -> Pin<Box<dyn Future<Output = Result<bool, OrderRepositoryError>> + Send + 'a>> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE orders SET status = $2, updated_at = $3 WHERE order_id = $1
                ",
            )
            .bind(order_id.as_str())
            .bind(status_str(status))
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| OrderRepositoryError::Database(e.to_string()))?;

            if result.rows_affected() == 0 {
                tracing::warn!(%order_id, "status transition targeted an unknown order");
                Ok(false)
            } else {
                Ok(true)
            }
        })
    }
}

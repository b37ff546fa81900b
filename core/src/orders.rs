//! The order aggregate read-model and its repository trait (spec §3, §4.4.1).
//!
//! This is a plain CRUD-ish read-model, not an event-sourced aggregate: the
//! order service writes it directly on create, and its own consumers update
//! `status` last-write-wins as inventory/cancellation events arrive.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::envelope::LineItem;
use crate::ids::OrderId;

/// Lifecycle state of an order aggregate (spec §4.4.1 state machine).
///
/// `PENDING` is the only non-terminal state. Every transition out of it is
/// last-write-wins with no guard against re-entering a terminal state from
/// another terminal state — matching the assumed source behavior (spec §11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
}

/// The order aggregate read-model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: OrderId,
    pub customer_id: String,
    pub items: Vec<LineItem>,
    pub total: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Errors from order repository operations.
#[derive(Debug, Error)]
pub enum OrderRepositoryError {
    #[error("database error: {0}")]
    Database(String),
}

/// The order aggregate store: idempotent create, last-write-wins status update.
///
/// Mirrors the dyn-compatible `Pin<Box<dyn Future>>` shape used by
/// [`crate::event_store::EventStore`] so it can be held as `Arc<dyn OrderRepository>`.
pub trait OrderRepository: Send + Sync {
    /// Create a new order with status `PENDING`. A duplicate `order_id` is not
    /// an error: the existing row is returned unchanged (spec §4.4.1 step 3,
    /// §7 idempotent create).
    ///
    /// # Errors
    ///
    /// Returns [`OrderRepositoryError`] on a backing-store failure.
    fn create<'a>(
        &'a self,
        order_id: &'a OrderId,
        customer_id: &'a str,
        items: &'a [LineItem],
        total: f64,
    ) -> Pin<Box<dyn Future<Output = Result<Order, OrderRepositoryError>> + Send + 'a>>;

    /// Look up an order by id.
    ///
    /// # Errors
    ///
    /// Returns [`OrderRepositoryError`] on a backing-store failure.
    fn find<'a>(
        &'a self,
        order_id: &'a OrderId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Order>, OrderRepositoryError>> + Send + 'a>>;

    /// Update `order_id`'s status, last-write-wins. A missing `order_id` is not
    /// fatal (spec §4.4.1 "unknown orderId is not fatal"): it is reported back
    /// as `Ok(false)` so the caller can log a warning without failing the
    /// consumer delivery.
    ///
    /// # Errors
    ///
    /// Returns [`OrderRepositoryError`] on a backing-store failure.
    fn update_status<'a>(
        &'a self,
        order_id: &'a OrderId,
        status: OrderStatus,
    ) -> Pin<Box<dyn Future<Output = Result<bool, OrderRepositoryError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&OrderStatus::Confirmed).unwrap();
        assert_eq!(json, "\"CONFIRMED\"");
    }
}

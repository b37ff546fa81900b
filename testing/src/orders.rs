//! In-memory [`OrderRepository`] double, backed by a `HashMap` guarded by a
//! mutex, mirroring the create/find/update-status semantics the Postgres
//! implementation enforces with SQL.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use chrono::Utc;
use orderflow_core::envelope::LineItem;
use orderflow_core::{Order, OrderId, OrderRepository, OrderRepositoryError, OrderStatus};

/// An `OrderRepository` backed by an in-process `HashMap`.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<HashMap<OrderId, Order>>,
}

impl InMemoryOrderRepository {
    /// Construct an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderRepository for InMemoryOrderRepository {
    fn create<'a>(
        &'a self,
        order_id: &'a OrderId,
        customer_id: &'a str,
        items: &'a [LineItem],
        total: f64,
    ) -> Pin<Box<dyn Future<Output = Result<Order, OrderRepositoryError>> + Send + 'a>> {
        Box::pin(async move {
            let mut orders = self
                .orders
                .lock()
                .map_err(|_| OrderRepositoryError::Database("mutex poisoned".to_string()))?;
            let order = orders.entry(order_id.clone()).or_insert_with(|| {
                let now = Utc::now();
                Order {
                    order_id: order_id.clone(),
                    customer_id: customer_id.to_string(),
                    items: items.to_vec(),
                    total,
                    status: OrderStatus::Pending,
                    created_at: now,
                    updated_at: now,
                }
            });
            Ok(order.clone())
        })
    }

    fn find<'a>(
        &'a self,
        order_id: &'a OrderId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Order>, OrderRepositoryError>> + Send + 'a>>
    {
        Box::pin(async move {
            let orders = self
                .orders
                .lock()
                .map_err(|_| OrderRepositoryError::Database("mutex poisoned".to_string()))?;
            Ok(orders.get(order_id).cloned())
        })
    }

    fn update_status<'a>(
        &'a self,
        order_id: &'a OrderId,
        status: OrderStatus,
    ) -> Pin<Box<dyn Future<Output = Result<bool, OrderRepositoryError>> + Send + 'a>> {
        Box::pin(async move {
            let mut orders = self
                .orders
                .lock()
                .map_err(|_| OrderRepositoryError::Database("mutex poisoned".to_string()))?;
            match orders.get_mut(order_id) {
                Some(order) => {
                    order.status = status;
                    order.updated_at = Utc::now();
                    Ok(true)
                },
                None => Ok(false),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_is_idempotent_and_returns_existing_row() {
        let repo = InMemoryOrderRepository::new();
        let id = OrderId::new();
        let first = repo.create(&id, "cust_1", &[], 10.0).await.unwrap();
        let second = repo.create(&id, "cust_2", &[], 99.0).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.customer_id, "cust_1");
    }

    #[tokio::test]
    async fn update_status_on_unknown_order_is_non_fatal() {
        let repo = InMemoryOrderRepository::new();
        let id = OrderId::new();
        let updated = repo.update_status(&id, OrderStatus::Cancelled).await.unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn update_status_is_last_write_wins() {
        let repo = InMemoryOrderRepository::new();
        let id = OrderId::new();
        repo.create(&id, "cust_1", &[], 10.0).await.unwrap();
        repo.update_status(&id, OrderStatus::Confirmed).await.unwrap();
        repo.update_status(&id, OrderStatus::Cancelled).await.unwrap();
        let order = repo.find(&id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }
}

//! In-memory [`IdempotencyStore`] double.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use orderflow_core::{IdempotencyError, IdempotencyStore, OrderId};

/// An `IdempotencyStore` backed by an in-process `HashMap`.
#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    keys: Mutex<HashMap<String, (OrderId, DateTime<Utc>)>>,
}

impl InMemoryIdempotencyStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<OrderId>, IdempotencyError>> + Send + 'a>> {
        Box::pin(async move {
            let keys = self
                .keys
                .lock()
                .map_err(|_| IdempotencyError::Database("mutex poisoned".to_string()))?;
            Ok(keys.get(key).and_then(|(order_id, expires_at)| {
                (*expires_at > Utc::now()).then(|| order_id.clone())
            }))
        })
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        order_id: &'a OrderId,
        expires_at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<(), IdempotencyError>> + Send + 'a>> {
        Box::pin(async move {
            let mut keys = self
                .keys
                .lock()
                .map_err(|_| IdempotencyError::Database("mutex poisoned".to_string()))?;
            keys.entry(key.to_string())
                .or_insert_with(|| (order_id.clone(), expires_at));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn put_is_first_write_wins() {
        let store = InMemoryIdempotencyStore::new();
        let first = OrderId::new();
        let second = OrderId::new();
        let expires = Utc::now() + Duration::hours(24);

        store.put("key-1", &first, expires).await.unwrap();
        store.put("key-1", &second, expires).await.unwrap();

        let found = store.get("key-1").await.unwrap();
        assert_eq!(found, Some(first));
    }

    #[tokio::test]
    async fn expired_key_is_treated_as_a_miss() {
        let store = InMemoryIdempotencyStore::new();
        let order_id = OrderId::new();
        let already_expired = Utc::now() - Duration::seconds(1);

        store.put("key-1", &order_id, already_expired).await.unwrap();

        assert_eq!(store.get("key-1").await.unwrap(), None);
    }
}

//! In-memory [`EventStore`] double: a vector guarded by a mutex, deduplicated
//! by `eventId` exactly like the Postgres implementation's unique index.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use orderflow_core::{Envelope, EventFilter, EventId, EventStore, EventStoreError};

/// An `EventStore` backed by an in-process `Vec`, for tests and
/// single-replica scenarios that don't need a real database.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<Envelope>>,
}

impl InMemoryEventStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored event, in insertion order. For assertions only.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned, which only happens if a
    /// prior access panicked while holding the lock.
    #[must_use]
    pub fn all(&self) -> Vec<Envelope> {
        self.events.lock().expect("event store mutex poisoned").clone()
    }
}

impl EventStore for InMemoryEventStore {
    fn append<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut events = self
                .events
                .lock()
                .map_err(|_| EventStoreError::Database("mutex poisoned".to_string()))?;
            if events.iter().any(|e| e.event_id == envelope.event_id) {
                return Ok(());
            }
            events.push(envelope.clone());
            Ok(())
        })
    }

    fn find_by_event_id<'a>(
        &'a self,
        event_id: EventId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Envelope>, EventStoreError>> + Send + 'a>> {
        Box::pin(async move {
            let events = self
                .events
                .lock()
                .map_err(|_| EventStoreError::Database("mutex poisoned".to_string()))?;
            Ok(events.iter().find(|e| e.event_id == event_id).cloned())
        })
    }

    fn find<'a>(
        &'a self,
        filter: &'a EventFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Envelope>, EventStoreError>> + Send + 'a>> {
        Box::pin(async move {
            let events = self
                .events
                .lock()
                .map_err(|_| EventStoreError::Database("mutex poisoned".to_string()))?;
            let mut matched: Vec<Envelope> =
                events.iter().filter(|e| filter.matches(e)).cloned().collect();
            matched.sort_by(|a, b| {
                a.occurred_at
                    .cmp(&b.occurred_at)
                    .then_with(|| a.event_id.as_uuid().cmp(&b.event_id.as_uuid()))
            });
            Ok(matched)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderflow_core::envelope::{OrdersCancelledPayload, Payload};
    use orderflow_core::CorrelationId;

    fn envelope(order_id: &str) -> Envelope {
        Envelope::new(
            "orders.cancelled",
            1,
            "order-service",
            CorrelationId::new(),
            Payload::OrdersCancelled(OrdersCancelledPayload {
                order_id: order_id.to_string().into(),
                reason: "r".to_string(),
            }),
        )
    }

    #[tokio::test]
    async fn append_is_idempotent_by_event_id() {
        let store = InMemoryEventStore::new();
        let e = envelope("ord_1");
        store.append(&e).await.unwrap();
        store.append(&e).await.unwrap();
        assert_eq!(store.all().len(), 1);
    }

    #[tokio::test]
    async fn find_sorts_by_occurred_at_then_event_id() {
        let store = InMemoryEventStore::new();
        let a = envelope("ord_1");
        let b = envelope("ord_2");
        store.append(&b).await.unwrap();
        store.append(&a).await.unwrap();

        let found = store.find(&EventFilter::all()).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].occurred_at <= found[1].occurred_at);
    }
}

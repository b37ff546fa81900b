//! The `EventStore` trait: append-only, idempotent-by-`eventId` persistence
//! (spec §4.3). Deliberately much thinner than the optimistic-concurrency,
//! per-stream-version store this crate's teacher reused elsewhere — this system
//! does not replay a single aggregate's stream to rebuild state, it replays
//! filtered slices of the whole log for operational tooling.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::envelope::Envelope;
use crate::ids::EventId;

/// Errors from event store operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Filter for a replay/query scan over the event store (spec §4.3, §4.5 replay tool).
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub order_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl EventFilter {
    /// An unfiltered scan of the whole store.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to a single event type.
    #[must_use]
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Restrict to a single order id.
    #[must_use]
    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    /// Restrict to `occurredAt >= from`.
    #[must_use]
    pub fn with_from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    /// Restrict to `occurredAt <= to`.
    #[must_use]
    pub fn with_to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    /// Whether `envelope` satisfies this filter. In-process implementations
    /// (the in-memory test double, and as a defensive re-check over a SQL
    /// result set) reuse this rather than duplicating the predicate.
    #[must_use]
    pub fn matches(&self, envelope: &Envelope) -> bool {
        if let Some(t) = &self.event_type {
            if &envelope.event_type != t {
                return false;
            }
        }
        if let Some(id) = &self.order_id {
            if envelope.order_id() != Some(id.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if envelope.occurred_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if envelope.occurred_at > to {
                return false;
            }
        }
        true
    }
}

/// The append-only event log every service writes to on both produce and consume.
///
/// Mirrors the teacher's dyn-compatible `Pin<Box<dyn Future>>` trait shape
/// (`core/src/event_store.rs`) so it can be held as `Arc<dyn EventStore>`.
pub trait EventStore: Send + Sync {
    /// Append an event. A duplicate `event_id` is treated as success — the
    /// second append is a no-op (spec §4.3 invariant, §7).
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError`] for any failure other than a duplicate key.
    fn append<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + 'a>>;

    /// Look up a single event by its identity.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError`] on a backing-store failure.
    fn find_by_event_id<'a>(
        &'a self,
        event_id: EventId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Envelope>, EventStoreError>> + Send + 'a>>;

    /// Filtered, ordered (`occurredAt` ASC, `eventId` ASC) scan for replay.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError`] on a backing-store failure.
    fn find<'a>(
        &'a self,
        filter: &'a EventFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Envelope>, EventStoreError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{OrdersCancelledPayload, Payload};
    use crate::ids::CorrelationId;

    fn envelope(order_id: &str, event_type: &str) -> Envelope {
        Envelope::new(
            event_type,
            1,
            "order-service",
            CorrelationId::new(),
            Payload::OrdersCancelled(OrdersCancelledPayload {
                order_id: order_id.to_string().into(),
                reason: "r".to_string(),
            }),
        )
    }

    #[test]
    fn filter_matches_on_order_id_and_type() {
        let e = envelope("ord_1", "orders.cancelled");
        let filter = EventFilter::all()
            .with_order_id("ord_1")
            .with_event_type("orders.cancelled");
        assert!(filter.matches(&e));

        let filter = EventFilter::all().with_order_id("ord_2");
        assert!(!filter.matches(&e));
    }

    #[test]
    fn filter_matches_on_time_range() {
        let e = envelope("ord_1", "orders.cancelled");
        let future = e.occurred_at + chrono::Duration::seconds(10);
        let past = e.occurred_at - chrono::Duration::seconds(10);

        assert!(EventFilter::all().with_from(past).matches(&e));
        assert!(!EventFilter::all().with_from(future).matches(&e));
        assert!(EventFilter::all().with_to(future).matches(&e));
        assert!(!EventFilter::all().with_to(past).matches(&e));
    }
}

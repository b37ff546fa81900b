//! Replays a filtered slice of an event store onto the broker, unchanged
//! except for transport headers marking the republish (spec §4.5, §6).
//!
//! The replay tool never mutates the event store: it only reads via
//! [`orderflow_core::EventStore::find`] and republishes via
//! [`orderflow_core::MessageBus::publish`].

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod routing;

use orderflow_core::{EventFilter, EventStore, MessageBus, MessageHeaders};
use thiserror::Error;
use tracing::warn;

pub use cli::Cli;

/// Errors replaying events onto the broker.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to query the event store: {0}")]
    Query(#[from] orderflow_core::EventStoreError),
}

/// Outcome of one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Events found by the filter and successfully republished.
    pub published: u32,
    /// Events found but skipped because their type has no known route.
    pub skipped_unknown_type: u32,
    /// Events found but skipped because republishing failed.
    pub skipped_publish_error: u32,
}

impl ReplaySummary {
    /// Whether any event failed to publish (a fatal condition for the CLI's exit code).
    #[must_use]
    pub const fn had_publish_errors(&self) -> bool {
        self.skipped_publish_error > 0
    }
}

/// Run one replay: query `events` with `filter`, in `(occurredAt ASC, eventId
/// ASC)` order (the event store's own ordering guarantee), and republish each
/// one onto `bus` with `x-replay=true`, `x-correlation-id`, and `x-group-id`
/// set from the envelope (spec §4.5).
///
/// # Errors
///
/// Returns [`ReplayError`] only if the initial query against the event store
/// fails; per-event publish failures are tallied in the returned summary
/// instead of aborting the run.
pub async fn replay(
    events: &dyn EventStore,
    bus: &dyn MessageBus,
    filter: &EventFilter,
) -> Result<ReplaySummary, ReplayError> {
    let found = events.find(filter).await?;
    let mut summary = ReplaySummary::default();

    for envelope in &found {
        let Some((exchange, routing_key)) = routing::route_for(&envelope.event_type) else {
            warn!(event_type = %envelope.event_type, event_id = %envelope.event_id, "no known route, skipping");
            summary.skipped_unknown_type += 1;
            continue;
        };

        let raw = envelope.to_raw();
        let mut headers = MessageHeaders::for_envelope(envelope);
        headers.replay = true;

        match bus.publish(exchange, routing_key, &raw, &headers).await {
            Ok(()) => summary.published += 1,
            Err(err) => {
                warn!(event_id = %envelope.event_id, error = %err, "failed to republish event");
                summary.skipped_publish_error += 1;
            },
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderflow_core::envelope::{OrdersCancelledPayload, Payload};
    use orderflow_core::CorrelationId;
    use orderflow_core::Envelope;
    use orderflow_testing::event_store::InMemoryEventStore;
    use orderflow_testing::message_bus::InMemoryMessageBus;

    fn cancelled(order_id: &str) -> Envelope {
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
    async fn republishes_matching_events_with_replay_headers() {
        let store = InMemoryEventStore::new();
        let envelope = cancelled("ord_12ab");
        store.append(&envelope).await.unwrap();

        let bus = InMemoryMessageBus::new();
        let filter = EventFilter::all().with_order_id("ord_12ab");

        let summary = replay(&store, &bus, &filter).await.unwrap();

        assert_eq!(summary.published, 1);
        assert_eq!(summary.skipped_unknown_type, 0);
        let published = bus.published();
        assert!(published[0].headers.replay);
        assert_eq!(published[0].headers.group_id, Some("ord_12ab".to_string()));
    }

    #[tokio::test]
    async fn does_not_mutate_the_event_store() {
        let store = InMemoryEventStore::new();
        store.append(&cancelled("ord_1")).await.unwrap();

        let bus = InMemoryMessageBus::new();
        replay(&store, &bus, &EventFilter::all()).await.unwrap();

        assert_eq!(store.all().len(), 1);
    }

    #[tokio::test]
    async fn unknown_event_type_is_skipped() {
        let store = InMemoryEventStore::new();
        let mut envelope = cancelled("ord_1");
        envelope.event_type = "something.unrouted".to_string();
        store.append(&envelope).await.unwrap();

        let bus = InMemoryMessageBus::new();
        let summary = replay(&store, &bus, &EventFilter::all()).await.unwrap();

        assert_eq!(summary.published, 0);
        assert_eq!(summary.skipped_unknown_type, 1);
        assert!(bus.published().is_empty());
    }
}

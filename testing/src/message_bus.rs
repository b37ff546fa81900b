//! An in-memory [`MessageBus`] spy plus a broker-free consumer harness.
//!
//! The harness replays the exact ack/retry/dlq decision algorithm
//! `orderflow-amqp::consumer` drives real deliveries through (schema check,
//! then `Decision`, then the 1-indexed `x-attempt` retry-budget check), so
//! the retry-exhaustion and schema-rejection properties can be asserted
//! without a running broker.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use orderflow_core::{
    Decision, Envelope, EnvelopeRaw, EventHandler, MessageBus, MessageBusError, MessageHeaders,
    SchemaRegistry,
};

/// One publish captured by [`InMemoryMessageBus`], for test assertions.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub raw: EnvelopeRaw,
    pub headers: MessageHeaders,
}

/// A `MessageBus` that records every publish instead of sending it anywhere.
#[derive(Default)]
pub struct InMemoryMessageBus {
    published: Mutex<Vec<PublishedMessage>>,
}

impl InMemoryMessageBus {
    /// Construct a bus with no recorded publishes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message published so far, in publish order. For assertions only.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned, which only happens if a
    /// prior access panicked while holding the lock.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().expect("message bus mutex poisoned").clone()
    }
}

impl MessageBus for InMemoryMessageBus {
    fn publish<'a>(
        &'a self,
        exchange: &'a str,
        routing_key: &'a str,
        raw: &'a EnvelopeRaw,
        headers: &'a MessageHeaders,
    ) -> Pin<Box<dyn Future<Output = Result<(), MessageBusError>> + Send + 'a>> {
        Box::pin(async move {
            let mut published = self
                .published
                .lock()
                .map_err(|_| MessageBusError::Transport("mutex poisoned".to_string()))?;
            published.push(PublishedMessage {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                raw: raw.clone(),
                headers: headers.clone(),
            });
            Ok(())
        })
    }
}

/// Outcome of feeding one delivery through [`deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The handler acked; processing is done.
    Acked,
    /// Retry budget remains; this would be republished with an incremented
    /// `x-attempt`.
    Retried { next_attempt: u32 },
    /// Routed to the dead-letter queue, either because the schema was
    /// invalid or because the retry budget (`max_attempts`) was exhausted.
    DeadLettered,
}

/// Feed one raw delivery at `attempt` (1-indexed, matching the real
/// consumer's `x-attempt` header convention) through schema validation and
/// `handler`, producing the same disposition `orderflow-amqp::consumer`
/// would reach for a live delivery.
pub async fn deliver(
    registry: &SchemaRegistry,
    handler: &dyn EventHandler,
    raw: &EnvelopeRaw,
    attempt: u32,
    max_attempts: u32,
) -> DeliveryOutcome {
    let envelope: Envelope = match registry.validate_incoming(raw) {
        Ok(envelope) => envelope,
        Err(_) => return DeliveryOutcome::DeadLettered,
    };

    match handler.handle(&envelope).await {
        Decision::Ack => DeliveryOutcome::Acked,
        Decision::Retry if attempt < max_attempts => DeliveryOutcome::Retried {
            next_attempt: attempt + 1,
        },
        Decision::Retry | Decision::Dlq => DeliveryOutcome::DeadLettered,
    }
}

/// Drive `raw` through [`deliver`] repeatedly, as the broker would on each
/// redelivery, until it is acked or dead-lettered. Returns the number of
/// attempts made and the final outcome — useful for asserting spec §8
/// property 5 (`maxRetries` redeliveries then exactly one DLQ appearance).
pub async fn deliver_until_resolved(
    registry: &SchemaRegistry,
    handler: &dyn EventHandler,
    raw: &EnvelopeRaw,
    max_attempts: u32,
) -> (u32, DeliveryOutcome) {
    let mut attempt = 1;
    loop {
        match deliver(registry, handler, raw, attempt, max_attempts).await {
            DeliveryOutcome::Retried { next_attempt } => {
                attempt = next_attempt;
            },
            outcome => return (attempt, outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderflow_core::ids::CorrelationId;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysRetry;

    impl EventHandler for AlwaysRetry {
        fn handle<'a>(
            &'a self,
            _envelope: &'a Envelope,
        ) -> Pin<Box<dyn Future<Output = Decision> + Send + 'a>> {
            Box::pin(async { Decision::Retry })
        }
    }

    struct FailNTimes {
        remaining: AtomicU32,
    }

    impl EventHandler for FailNTimes {
        fn handle<'a>(
            &'a self,
            _envelope: &'a Envelope,
        ) -> Pin<Box<dyn Future<Output = Decision> + Send + 'a>> {
            Box::pin(async move {
                if self.remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    (n > 0).then_some(n - 1)
                }).is_ok() {
                    Decision::Retry
                } else {
                    Decision::Ack
                }
            })
        }
    }

    fn cancelled_raw() -> EnvelopeRaw {
        EnvelopeRaw {
            event_id: orderflow_core::EventId::new(),
            event_type: "orders.cancelled".to_string(),
            version: 1,
            occurred_at: chrono::Utc::now(),
            producer: "order-service".to_string(),
            correlation_id: CorrelationId::new(),
            payload: json!({"orderId": "ord_1", "reason": "r"}),
        }
    }

    #[tokio::test]
    async fn message_bus_records_publishes() {
        let bus = InMemoryMessageBus::new();
        let raw = cancelled_raw();
        let headers = MessageHeaders {
            correlation_id: raw.correlation_id.as_str().to_string(),
            group_id: Some("ord_1".to_string()),
            attempt: 0,
            replay: false,
        };
        bus.publish("orderflow.events", "orders.cancelled", &raw, &headers)
            .await
            .unwrap();

        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].routing_key, "orders.cancelled");
    }

    #[tokio::test]
    async fn always_failing_handler_exhausts_retry_budget_then_dlqs() {
        let registry = SchemaRegistry;
        let handler = AlwaysRetry;
        let max_attempts = 4; // maxRetries = 3
        let raw = cancelled_raw();

        let (attempts, outcome) =
            deliver_until_resolved(&registry, &handler, &raw, max_attempts).await;

        assert_eq!(attempts, max_attempts);
        assert_eq!(outcome, DeliveryOutcome::DeadLettered);
    }

    #[tokio::test]
    async fn handler_that_recovers_within_budget_acks() {
        let registry = SchemaRegistry;
        let handler = FailNTimes {
            remaining: AtomicU32::new(2),
        };
        let raw = cancelled_raw();

        let (attempts, outcome) = deliver_until_resolved(&registry, &handler, &raw, 4).await;

        assert_eq!(attempts, 3);
        assert_eq!(outcome, DeliveryOutcome::Acked);
    }

    #[tokio::test]
    async fn schema_invalid_message_is_dead_lettered_on_first_delivery() {
        let registry = SchemaRegistry;
        let handler = AlwaysRetry;
        let mut raw = cancelled_raw();
        raw.payload = json!({"orderId": "ord_1"}); // missing `reason`

        let outcome = deliver(&registry, &handler, &raw, 1, 4).await;

        assert_eq!(outcome, DeliveryOutcome::DeadLettered);
    }
}

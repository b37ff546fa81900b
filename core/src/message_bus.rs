//! Broker-agnostic publish contract (spec §4.2) plus the `EventHandler`/`Decision`
//! contract a consumer runtime drives handlers through.
//!
//! `MessageBus` itself only has a `publish` operation: the consume side is richer
//! (prefetch, ack/retry/dlq, attempt headers) and is owned by the concrete broker
//! crate (`orderflow-amqp`), which drives handlers implementing [`EventHandler`]
//! defined here so that the in-memory test double in `orderflow-testing` can
//! exercise the exact same handler code real services register.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::envelope::{Envelope, EnvelopeRaw};

/// Errors publishing to or inspecting the broker.
#[derive(Debug, Error)]
pub enum MessageBusError {
    #[error("connection to broker failed: {0}")]
    ConnectionFailed(String),

    #[error("failed to publish to {exchange}/{routing_key}: {reason}")]
    PublishFailed {
        exchange: String,
        routing_key: String,
        reason: String,
    },

    #[error("failed to declare topology: {0}")]
    TopologyFailed(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Headers every publish carries (spec §4.2 publish contract).
#[derive(Debug, Clone, Default)]
pub struct MessageHeaders {
    pub correlation_id: String,
    pub group_id: Option<String>,
    pub attempt: u32,
    pub replay: bool,
}

impl MessageHeaders {
    /// Build headers for a first-attempt publish of `envelope`.
    #[must_use]
    pub fn for_envelope(envelope: &Envelope) -> Self {
        Self {
            correlation_id: envelope.correlation_id.as_str().to_string(),
            group_id: envelope.order_id().map(str::to_string),
            attempt: 0,
            replay: false,
        }
    }

    /// As a flat string map, the shape every broker header API ultimately wants.
    #[must_use]
    pub fn as_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("x-correlation-id".to_string(), self.correlation_id.clone());
        if let Some(group) = &self.group_id {
            map.insert("x-group-id".to_string(), group.clone());
        }
        map.insert("x-attempt".to_string(), self.attempt.to_string());
        if self.replay {
            map.insert("x-replay".to_string(), "true".to_string());
        }
        map
    }
}

/// Publish-only view of the messaging substrate.
///
/// Dyn-compatible via `Pin<Box<dyn Future>>`, matching the teacher's
/// `core/src/event_bus.rs` `EventBus` trait shape so it can be held as
/// `Arc<dyn MessageBus>` across service handlers.
pub trait MessageBus: Send + Sync {
    /// Publish `raw` to `exchange` with `routing_key` and `headers`.
    ///
    /// Implementations mark the message persistent and
    /// `content-type: application/json` (spec §4.2).
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError`] if the broker rejects or cannot be reached.
    fn publish<'a>(
        &'a self,
        exchange: &'a str,
        routing_key: &'a str,
        raw: &'a EnvelopeRaw,
        headers: &'a MessageHeaders,
    ) -> Pin<Box<dyn Future<Output = Result<(), MessageBusError>> + Send + 'a>>;
}

/// What a handler decides to do with a delivered message (spec §4.2 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Acknowledge; processing is done.
    Ack,
    /// Transient failure: redeliver via the retry queue (or DLQ if attempts exhausted).
    Retry,
    /// Terminal failure: route straight to the dead-letter queue.
    Dlq,
}

/// A handler bound to one queue by the consumer runtime.
///
/// Implementations are typically thin wrappers around a service's business
/// logic (e.g. the inventory stock rule) that also append to the event store.
pub trait EventHandler: Send + Sync {
    /// Handle a single validated envelope and decide its disposition.
    ///
    /// An `Err` return (any error, including a panic caught by the runtime) is
    /// treated the same as returning `Decision::Retry` (spec §4.2 step 5).
    fn handle<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Decision> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{OrdersCancelledPayload, Payload};
    use crate::ids::CorrelationId;

    #[test]
    fn headers_carry_group_id_from_order_id() {
        let envelope = Envelope::new(
            "orders.cancelled",
            1,
            "order-service",
            CorrelationId::new(),
            Payload::OrdersCancelled(OrdersCancelledPayload {
                order_id: "ord_1".to_string().into(),
                reason: "r".to_string(),
            }),
        );
        let headers = MessageHeaders::for_envelope(&envelope);
        let map = headers.as_map();
        assert_eq!(map.get("x-group-id"), Some(&"ord_1".to_string()));
        assert_eq!(map.get("x-attempt"), Some(&"0".to_string()));
        assert!(!map.contains_key("x-replay"));
    }
}

//! Shared application state for the order service's HTTP handlers and consumers.

use std::sync::Arc;
use std::time::Duration;

use lapin::Channel;
use orderflow_core::{EventStore, IdempotencyStore, MessageBus, OrderRepository, SchemaRegistry};
use orderflow_web::Readiness;

/// State shared across every HTTP handler and consumer in the order service.
///
/// Cheap to clone: every field is an `Arc`, a `Copy` type, or a small `String`.
#[derive(Clone)]
pub struct OrderServiceState {
    pub orders: Arc<dyn OrderRepository>,
    pub events: Arc<dyn EventStore>,
    pub bus: Arc<dyn MessageBus>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub registry: SchemaRegistry,
    /// This service's name, stamped as every envelope's `producer` field.
    pub producer: String,
    /// TTL applied to a newly recorded `Idempotency-Key` mapping.
    pub idempotency_ttl: Duration,
    /// Readiness probes (database ping, broker reachability) for `GET /ready`.
    pub readiness: Arc<Readiness>,
    /// Dedicated channel used only to passively inspect dead-letter queue depths.
    pub dlq_channel: Channel,
}

//! The event envelope: the structure common to every message this core produces
//! or consumes, plus the typed payloads for the five event types in §3 of the spec.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{CorrelationId, EventId, OrderId};

/// An envelope whose payload has not yet been validated against its schema.
///
/// This is what arrives off the wire (or is about to be put on it): the payload
/// is an untyped [`Value`] until [`crate::schema::SchemaRegistry`] has checked it
/// against the `(type, version)` it claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeRaw {
    pub event_id: EventId,
    #[serde(rename = "type")]
    pub event_type: String,
    pub version: u32,
    pub occurred_at: DateTime<Utc>,
    pub producer: String,
    pub correlation_id: CorrelationId,
    pub payload: Value,
}

/// An envelope whose payload has been validated and parsed into a [`Payload`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub event_id: EventId,
    #[serde(rename = "type")]
    pub event_type: String,
    pub version: u32,
    pub occurred_at: DateTime<Utc>,
    pub producer: String,
    pub correlation_id: CorrelationId,
    pub payload: Payload,
}

impl Envelope {
    /// Construct a new envelope with a fresh `event_id` and `occurred_at` stamped now.
    ///
    /// `occurred_at` is assigned once, at construction, and must never be rewritten
    /// by replay (spec §3 invariant).
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        version: u32,
        producer: impl Into<String>,
        correlation_id: CorrelationId,
        payload: Payload,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            version,
            occurred_at: Utc::now(),
            producer: producer.into(),
            correlation_id,
            payload,
        }
    }

    /// The `orderId` carried by this envelope's payload, if any. Used for the
    /// event store's secondary index and for `x-group-id` headers.
    #[must_use]
    pub fn order_id(&self) -> Option<&str> {
        self.payload.order_id()
    }

    /// Serialize the payload back to a raw envelope, e.g. for publishing.
    ///
    /// # Panics
    ///
    /// Never panics for the payload types defined in this crate: every variant
    /// serializes to a JSON object.
    #[must_use]
    pub fn to_raw(&self) -> EnvelopeRaw {
        #[allow(clippy::unwrap_used)]
        let payload = serde_json::to_value(&self.payload).unwrap();
        EnvelopeRaw {
            event_id: self.event_id,
            event_type: self.event_type.clone(),
            version: self.version,
            occurred_at: self.occurred_at,
            producer: self.producer.clone(),
            correlation_id: self.correlation_id.clone(),
            payload,
        }
    }
}

/// A single line item on an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price: f64,
}

/// `notification.sent` payload `kind` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderCreated,
    OrderConfirmed,
    OrderRejected,
    OrderCancelled,
}

/// The typed payload union for every event type this core knows about.
///
/// Tagged externally by the envelope's `type`/`version` fields rather than by
/// serde's internal tagging, since the registry looks up the schema before it
/// knows which variant to parse into.
/// Only `Serialize` is derived here: deserialization is ambiguous for an untagged
/// enum whose variants can share a shape (`OrdersCancelledPayload` and
/// `InventoryReserveRejectedPayload` are both `{orderId, reason}`). Building a
/// `Payload` from raw bytes always goes through [`crate::schema::SchemaRegistry`],
/// which knows the envelope's `type` and dispatches to the right concrete struct.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Payload {
    OrdersCreated(OrdersCreatedPayload),
    OrdersCancelled(OrdersCancelledPayload),
    InventoryReserveApproved(InventoryReserveApprovedPayload),
    InventoryReserveRejected(InventoryReserveRejectedPayload),
    NotificationSent(NotificationSentPayload),
}

impl Payload {
    pub(crate) fn order_id(&self) -> Option<&str> {
        match self {
            Payload::OrdersCreated(p) => Some(p.order_id.as_str()),
            Payload::OrdersCancelled(p) => Some(p.order_id.as_str()),
            Payload::InventoryReserveApproved(p) => Some(p.order_id.as_str()),
            Payload::InventoryReserveRejected(p) => Some(p.order_id.as_str()),
            Payload::NotificationSent(p) => Some(p.order_id.as_str()),
        }
    }
}

/// Payload for `orders.created`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersCreatedPayload {
    pub order_id: OrderId,
    pub customer_id: String,
    pub items: Vec<LineItem>,
    pub total: f64,
}

/// Payload for `orders.cancelled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersCancelledPayload {
    pub order_id: OrderId,
    pub reason: String,
}

/// Payload for `inventory.reserve.approved`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReserveApprovedPayload {
    pub order_id: OrderId,
    pub reservation_id: String,
}

/// Payload for `inventory.reserve.rejected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReserveRejectedPayload {
    pub order_id: OrderId,
    pub reason: String,
}

/// Payload for `notification.sent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSentPayload {
    pub order_id: OrderId,
    pub kind: NotificationKind,
    pub channel: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_raw() {
        let payload = Payload::OrdersCreated(OrdersCreatedPayload {
            order_id: OrderId::from("ord_abc123".to_string()),
            customer_id: "cust_1".to_string(),
            items: vec![LineItem {
                product_id: "sku_1".to_string(),
                quantity: 2,
                unit_price: 9.99,
            }],
            total: 19.98,
        });
        let envelope = Envelope::new(
            "orders.created",
            1,
            "order-service",
            CorrelationId::new(),
            payload,
        );

        let raw = envelope.to_raw();
        assert_eq!(raw.event_id, envelope.event_id);
        assert_eq!(raw.event_type, "orders.created");
        assert_eq!(raw.payload["orderId"], "ord_abc123");
    }

    #[test]
    fn order_id_accessor_covers_every_variant() {
        let oid = OrderId::from("ord_x".to_string());
        let variants = vec![
            Payload::OrdersCreated(OrdersCreatedPayload {
                order_id: oid.clone(),
                customer_id: "c".into(),
                items: vec![],
                total: 0.0,
            }),
            Payload::OrdersCancelled(OrdersCancelledPayload {
                order_id: oid.clone(),
                reason: "r".into(),
            }),
            Payload::InventoryReserveApproved(InventoryReserveApprovedPayload {
                order_id: oid.clone(),
                reservation_id: "res".into(),
            }),
            Payload::InventoryReserveRejected(InventoryReserveRejectedPayload {
                order_id: oid.clone(),
                reason: "r".into(),
            }),
            Payload::NotificationSent(NotificationSentPayload {
                order_id: oid.clone(),
                kind: NotificationKind::OrderCreated,
                channel: "log".into(),
            }),
        ];
        for v in variants {
            assert_eq!(v.order_id(), Some(oid.as_str()));
        }
    }
}

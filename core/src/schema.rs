//! The `(type, version) -> validator` registry (spec §4.1).
//!
//! Validation runs in both directions: [`SchemaRegistry::validate_outgoing`] before
//! a producer publishes, [`SchemaRegistry::validate_incoming`] before a consumer
//! hands an envelope to a handler. Both paths funnel through the same per-type
//! structural checks, so a schema can never be satisfied on one side and rejected
//! on the other.

use serde_json::Value;
use thiserror::Error;

use crate::envelope::{
    Envelope, EnvelopeRaw, InventoryReserveApprovedPayload, InventoryReserveRejectedPayload,
    LineItem, NotificationSentPayload, OrdersCancelledPayload, OrdersCreatedPayload, Payload,
};

/// A schema validation failure. Carries enough detail for the consumer runtime
/// to log a useful DLQ reason without retrying (schema failures are never transient).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("unknown event type/version: {event_type} v{version}")]
    UnknownType { event_type: String, version: u32 },

    #[error("field '{field}' is required")]
    MissingField { field: &'static str },

    #[error("field '{field}' must not be empty")]
    EmptyField { field: &'static str },

    #[error("field '{field}' must be positive, got {value}")]
    NotPositive { field: &'static str, value: String },

    #[error("field '{field}' must contain at least one item")]
    EmptyCollection { field: &'static str },

    #[error("field '{field}' has the wrong shape: {reason}")]
    Malformed { field: &'static str, reason: String },
}

/// The registry of known `(type, version)` schemas.
///
/// There is one registry instance per service; every service links the same
/// schema set since all three need to validate every event type they might
/// produce or consume.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaRegistry;

impl SchemaRegistry {
    /// Validate and parse a raw envelope as it arrives off the broker.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if `(type, version)` is unknown or the payload
    /// fails structural validation. Callers route this straight to the DLQ;
    /// it is never retried (spec §4.2 step 2, §7).
    pub fn validate_incoming(&self, raw: &EnvelopeRaw) -> Result<Envelope, SchemaError> {
        let payload = self.parse_payload(&raw.event_type, raw.version, &raw.payload)?;
        Ok(Envelope {
            event_id: raw.event_id,
            event_type: raw.event_type.clone(),
            version: raw.version,
            occurred_at: raw.occurred_at,
            producer: raw.producer.clone(),
            correlation_id: raw.correlation_id.clone(),
            payload,
        })
    }

    /// Validate an envelope a producer is about to publish.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the envelope's own payload somehow fails its
    /// own schema (defensive: this only happens if a caller hand-built a
    /// `Payload` with invalid data instead of going through a constructor that
    /// enforces it). On failure the caller must not publish (spec §7).
    pub fn validate_outgoing(&self, envelope: &Envelope) -> Result<(), SchemaError> {
        let raw = envelope.to_raw();
        self.parse_payload(&raw.event_type, raw.version, &raw.payload)?;
        Ok(())
    }

    /// Returns true if a schema is registered for `(event_type, version)`.
    #[must_use]
    pub fn has_schema(&self, event_type: &str, version: u32) -> bool {
        matches!(
            (event_type, version),
            ("orders.created", 1)
                | ("orders.cancelled", 1)
                | ("inventory.reserve.approved", 1)
                | ("inventory.reserve.rejected", 1)
                | ("notification.sent", 1)
        )
    }

    fn parse_payload(
        &self,
        event_type: &str,
        version: u32,
        value: &Value,
    ) -> Result<Payload, SchemaError> {
        match (event_type, version) {
            ("orders.created", 1) => parse_orders_created(value).map(Payload::OrdersCreated),
            ("orders.cancelled", 1) => {
                parse_orders_cancelled(value).map(Payload::OrdersCancelled)
            },
            ("inventory.reserve.approved", 1) => {
                parse_inventory_approved(value).map(Payload::InventoryReserveApproved)
            },
            ("inventory.reserve.rejected", 1) => {
                parse_inventory_rejected(value).map(Payload::InventoryReserveRejected)
            },
            ("notification.sent", 1) => {
                parse_notification_sent(value).map(Payload::NotificationSent)
            },
            _ => Err(SchemaError::UnknownType {
                event_type: event_type.to_string(),
                version,
            }),
        }
    }
}

fn non_empty_str(value: &Value, field: &'static str) -> Result<String, SchemaError> {
    let s = value
        .get(field)
        .ok_or(SchemaError::MissingField { field })?
        .as_str()
        .ok_or(SchemaError::Malformed {
            field,
            reason: "expected a string".to_string(),
        })?;
    if s.is_empty() {
        return Err(SchemaError::EmptyField { field });
    }
    Ok(s.to_string())
}

fn positive_f64(value: &Value, field: &'static str) -> Result<f64, SchemaError> {
    let n = value
        .get(field)
        .ok_or(SchemaError::MissingField { field })?
        .as_f64()
        .ok_or(SchemaError::Malformed {
            field,
            reason: "expected a number".to_string(),
        })?;
    if n <= 0.0 {
        return Err(SchemaError::NotPositive {
            field,
            value: n.to_string(),
        });
    }
    Ok(n)
}

fn parse_orders_created(value: &Value) -> Result<OrdersCreatedPayload, SchemaError> {
    let order_id = non_empty_str(value, "orderId")?.into();
    let customer_id = non_empty_str(value, "customerId")?;
    let items_value = value
        .get("items")
        .ok_or(SchemaError::MissingField { field: "items" })?
        .as_array()
        .ok_or(SchemaError::Malformed {
            field: "items",
            reason: "expected an array".to_string(),
        })?;
    if items_value.is_empty() {
        return Err(SchemaError::EmptyCollection { field: "items" });
    }
    let mut items = Vec::with_capacity(items_value.len());
    for item in items_value {
        let product_id = non_empty_str(item, "productId")?;
        let quantity = item
            .get("quantity")
            .ok_or(SchemaError::MissingField { field: "quantity" })?
            .as_u64()
            .filter(|q| *q > 0)
            .ok_or(SchemaError::NotPositive {
                field: "quantity",
                value: item.get("quantity").map_or_else(
                    || "missing".to_string(),
                    std::string::ToString::to_string,
                ),
            })?;
        let unit_price = positive_f64(item, "unitPrice")?;
        items.push(LineItem {
            product_id,
            quantity: quantity as u32,
            unit_price,
        });
    }
    let total = positive_f64(value, "total")?;
    Ok(OrdersCreatedPayload {
        order_id,
        customer_id,
        items,
        total,
    })
}

fn parse_orders_cancelled(value: &Value) -> Result<OrdersCancelledPayload, SchemaError> {
    Ok(OrdersCancelledPayload {
        order_id: non_empty_str(value, "orderId")?.into(),
        reason: non_empty_str(value, "reason")?,
    })
}

fn parse_inventory_approved(
    value: &Value,
) -> Result<InventoryReserveApprovedPayload, SchemaError> {
    Ok(InventoryReserveApprovedPayload {
        order_id: non_empty_str(value, "orderId")?.into(),
        reservation_id: non_empty_str(value, "reservationId")?,
    })
}

fn parse_inventory_rejected(
    value: &Value,
) -> Result<InventoryReserveRejectedPayload, SchemaError> {
    Ok(InventoryReserveRejectedPayload {
        order_id: non_empty_str(value, "orderId")?.into(),
        reason: non_empty_str(value, "reason")?,
    })
}

fn parse_notification_sent(value: &Value) -> Result<NotificationSentPayload, SchemaError> {
    let order_id = non_empty_str(value, "orderId")?.into();
    let kind_str = non_empty_str(value, "kind")?;
    let kind = match kind_str.as_str() {
        "order_created" => crate::envelope::NotificationKind::OrderCreated,
        "order_confirmed" => crate::envelope::NotificationKind::OrderConfirmed,
        "order_rejected" => crate::envelope::NotificationKind::OrderRejected,
        "order_cancelled" => crate::envelope::NotificationKind::OrderCancelled,
        other => {
            return Err(SchemaError::Malformed {
                field: "kind",
                reason: format!("unknown kind '{other}'"),
            })
        },
    };
    let channel = non_empty_str(value, "channel")?;
    Ok(NotificationSentPayload {
        order_id,
        kind,
        channel,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CorrelationId, OrderId};
    use serde_json::json;

    fn sample_raw(event_type: &str, version: u32, payload: Value) -> EnvelopeRaw {
        EnvelopeRaw {
            event_id: crate::ids::EventId::new(),
            event_type: event_type.to_string(),
            version,
            occurred_at: chrono::Utc::now(),
            producer: "order-service".to_string(),
            correlation_id: CorrelationId::new(),
            payload,
        }
    }

    #[test]
    fn every_registered_type_round_trips() {
        let registry = SchemaRegistry;
        let cases = vec![
            (
                "orders.created",
                json!({
                    "orderId": "ord_1", "customerId": "cust_1", "total": 19.98,
                    "items": [{"productId": "sku_1", "quantity": 2, "unitPrice": 9.99}]
                }),
            ),
            (
                "orders.cancelled",
                json!({"orderId": "ord_1", "reason": "customer request"}),
            ),
            (
                "inventory.reserve.approved",
                json!({"orderId": "ord_1", "reservationId": "res_1"}),
            ),
            (
                "inventory.reserve.rejected",
                json!({"orderId": "ord_1", "reason": "insufficient_stock"}),
            ),
            (
                "notification.sent",
                json!({"orderId": "ord_1", "kind": "order_created", "channel": "log"}),
            ),
        ];
        for (event_type, payload) in cases {
            let raw = sample_raw(event_type, 1, payload);
            let envelope = registry.validate_incoming(&raw).unwrap();
            registry.validate_outgoing(&envelope).unwrap();
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let registry = SchemaRegistry;
        let raw = sample_raw("orders.created", 99, json!({}));
        assert!(matches!(
            registry.validate_incoming(&raw),
            Err(SchemaError::UnknownType { .. })
        ));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let registry = SchemaRegistry;
        let raw = sample_raw("orders.cancelled", 1, json!({"orderId": "ord_1"}));
        assert_eq!(
            registry.validate_incoming(&raw),
            Err(SchemaError::MissingField { field: "reason" })
        );
    }

    #[test]
    fn empty_items_is_rejected() {
        let registry = SchemaRegistry;
        let raw = sample_raw(
            "orders.created",
            1,
            json!({"orderId": "ord_1", "customerId": "cust_1", "total": 1.0, "items": []}),
        );
        assert_eq!(
            registry.validate_incoming(&raw),
            Err(SchemaError::EmptyCollection { field: "items" })
        );
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let registry = SchemaRegistry;
        let raw = sample_raw(
            "orders.created",
            1,
            json!({
                "orderId": "ord_1", "customerId": "cust_1", "total": 1.0,
                "items": [{"productId": "sku_1", "quantity": 0, "unitPrice": 1.0}]
            }),
        );
        assert!(registry.validate_incoming(&raw).is_err());
    }

    #[test]
    fn order_id_accessor_reads_through_envelope() {
        let registry = SchemaRegistry;
        let raw = sample_raw(
            "orders.cancelled",
            1,
            json!({"orderId": "ord_xyz", "reason": "r"}),
        );
        let envelope = registry.validate_incoming(&raw).unwrap();
        assert_eq!(envelope.order_id(), Some("ord_xyz"));
        assert_eq!(envelope.payload.order_id(), Some(OrderId::from("ord_xyz".to_string()).as_str()));
    }
}

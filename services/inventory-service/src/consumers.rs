//! The reservation stock rule and the cancellation sink (spec §4.4.2).

use std::sync::Arc;

use orderflow_core::envelope::{InventoryReserveApprovedPayload, InventoryReserveRejectedPayload};
use orderflow_core::{
    CorrelationId, Decision, Envelope, EventHandler, EventStore, MessageBus, MessageHeaders,
    Payload, SchemaRegistry,
};
use orderflow_amqp::topology::EXCHANGE_INVENTORY;
use tracing::{error, warn};
use uuid::Uuid;

/// Inclusive upper bound on total reserved quantity for an approval. Below
/// this (and above zero) the reservation is approved; otherwise it is
/// rejected with `insufficient_stock` (spec §4.4.2).
const DEFAULT_STOCK_LIMIT: u32 = 10;

/// Consumes `order.created.q`: applies the reservation stock rule and
/// publishes the approval or rejection event.
pub struct OrderCreatedHandler {
    pub events: Arc<dyn EventStore>,
    pub bus: Arc<dyn MessageBus>,
    pub registry: SchemaRegistry,
    pub producer: String,
    pub stock_limit: u32,
}

impl OrderCreatedHandler {
    /// Construct a handler using the default stock limit of 10 (spec §4.4.2).
    #[must_use]
    pub fn new(events: Arc<dyn EventStore>, bus: Arc<dyn MessageBus>, producer: String) -> Self {
        Self {
            events,
            bus,
            registry: SchemaRegistry,
            producer,
            stock_limit: DEFAULT_STOCK_LIMIT,
        }
    }
}

impl EventHandler for OrderCreatedHandler {
    fn handle<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Decision> + Send + 'a>> {
        Box::pin(async move {
            let Payload::OrdersCreated(created) = &envelope.payload else {
                error!(event_id = %envelope.event_id, "order.created.q received a non-matching payload");
                return Decision::Dlq;
            };

            if let Err(err) = self.events.append(envelope).await {
                error!(error = %err, "failed to append orders.created, retrying");
                return Decision::Retry;
            }

            let total_quantity: u64 = created.items.iter().map(|item| u64::from(item.quantity)).sum();
            let approved = total_quantity > 0 && total_quantity <= u64::from(self.stock_limit);

            let outcome_payload = if approved {
                Payload::InventoryReserveApproved(InventoryReserveApprovedPayload {
                    order_id: created.order_id.clone(),
                    reservation_id: format!("res_{}", Uuid::new_v4().simple()),
                })
            } else {
                Payload::InventoryReserveRejected(InventoryReserveRejectedPayload {
                    order_id: created.order_id.clone(),
                    reason: "insufficient_stock".to_string(),
                })
            };

            let event_type = if approved {
                "inventory.reserve.approved"
            } else {
                "inventory.reserve.rejected"
            };
            let routing_key = format!("{event_type}.v1");

            let outcome = Envelope::new(
                event_type,
                1,
                self.producer.clone(),
                CorrelationId::from(envelope.correlation_id.as_str().to_string()),
                outcome_payload,
            );

            if self.registry.validate_outgoing(&outcome).is_err() {
                error!(event_id = %outcome.event_id, "constructed an invalid reservation outcome envelope");
                return Decision::Dlq;
            }
            if let Err(err) = self.events.append(&outcome).await {
                error!(error = %err, "failed to append reservation outcome, retrying");
                return Decision::Retry;
            }

            let raw = outcome.to_raw();
            let headers = MessageHeaders::for_envelope(&outcome);
            match self.bus.publish(EXCHANGE_INVENTORY, &routing_key, &raw, &headers).await {
                Ok(()) => Decision::Ack,
                Err(err) => {
                    error!(error = %err, "failed to publish reservation outcome, retrying");
                    Decision::Retry
                },
            }
        })
    }
}

/// Consumes `orders.cancelled.q`: records the event. Restock is a no-op in
/// this core (spec §4.4.2).
pub struct OrderCancelledHandler {
    pub events: Arc<dyn EventStore>,
}

impl EventHandler for OrderCancelledHandler {
    fn handle<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Decision> + Send + 'a>> {
        Box::pin(async move {
            if !matches!(envelope.payload, Payload::OrdersCancelled(_)) {
                warn!(event_id = %envelope.event_id, "orders.cancelled.q received a non-matching payload");
                return Decision::Dlq;
            }
            match self.events.append(envelope).await {
                Ok(()) => Decision::Ack,
                Err(err) => {
                    error!(error = %err, "failed to append orders.cancelled, retrying");
                    Decision::Retry
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderflow_core::envelope::LineItem;
    use orderflow_core::OrderId;
    use orderflow_testing::event_store::InMemoryEventStore;
    use orderflow_testing::message_bus::InMemoryMessageBus;

    fn created_envelope(order_id: &str, quantities: &[u32]) -> Envelope {
        let items = quantities
            .iter()
            .map(|q| LineItem {
                product_id: "sku_1".to_string(),
                quantity: *q,
                unit_price: 1.0,
            })
            .collect::<Vec<_>>();
        let total: f64 = items.iter().map(|i| f64::from(i.quantity) * i.unit_price).sum();
        Envelope::new(
            "orders.created",
            1,
            "order-service",
            CorrelationId::new(),
            Payload::OrdersCreated(orderflow_core::envelope::OrdersCreatedPayload {
                order_id: OrderId::from(order_id.to_string()),
                customer_id: "cust_1".to_string(),
                items,
                total,
            }),
        )
    }

    #[tokio::test]
    async fn approves_when_total_quantity_is_within_limit() {
        let events = Arc::new(InMemoryEventStore::new());
        let bus = Arc::new(InMemoryMessageBus::new());
        let handler = OrderCreatedHandler::new(events, bus.clone(), "inventory-service".to_string());

        let envelope = created_envelope("ord_1", &[5, 3]);
        let decision = handler.handle(&envelope).await;

        assert_eq!(decision, Decision::Ack);
        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].exchange, EXCHANGE_INVENTORY);
        assert_eq!(published[0].routing_key, "inventory.reserve.approved.v1");
    }

    #[tokio::test]
    async fn rejects_when_total_quantity_exceeds_limit() {
        let events = Arc::new(InMemoryEventStore::new());
        let bus = Arc::new(InMemoryMessageBus::new());
        let handler = OrderCreatedHandler::new(events, bus.clone(), "inventory-service".to_string());

        let envelope = created_envelope("ord_2", &[11]);
        let decision = handler.handle(&envelope).await;

        assert_eq!(decision, Decision::Ack);
        let published = bus.published();
        assert_eq!(published[0].routing_key, "inventory.reserve.rejected.v1");
    }

    #[tokio::test]
    async fn cancelled_handler_appends_without_publishing() {
        let events = Arc::new(InMemoryEventStore::new());
        let handler = OrderCancelledHandler {
            events: events.clone(),
        };
        let envelope = Envelope::new(
            "orders.cancelled",
            1,
            "order-service",
            CorrelationId::new(),
            Payload::OrdersCancelled(orderflow_core::envelope::OrdersCancelledPayload {
                order_id: OrderId::from("ord_3".to_string()),
                reason: "customer request".to_string(),
            }),
        );

        let decision = handler.handle(&envelope).await;
        assert_eq!(decision, Decision::Ack);
        assert_eq!(events.all().len(), 1);
    }
}

//! Inventory-event consumers that drive the order state machine (spec §4.4.1,
//! §4.4.2): `inventory.reserve.approved` confirms an order, `inventory.reserve.rejected`
//! rejects it. Both are last-write-wins status updates with no guard against
//! an order already in a terminal state.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use orderflow_core::{
    Decision, Envelope, EventHandler, EventStore, OrderRepository, OrderStatus, Payload,
};

/// Confirms the order named in an `inventory.reserve.approved` event.
pub struct ReserveApprovedHandler {
    pub orders: Arc<dyn OrderRepository>,
    pub events: Arc<dyn EventStore>,
}

impl EventHandler for ReserveApprovedHandler {
    fn handle<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Decision> + Send + 'a>> {
        Box::pin(async move {
            let Payload::InventoryReserveApproved(payload) = &envelope.payload else {
                tracing::error!(event_type = %envelope.event_type, "handler bound to the wrong payload type");
                return Decision::Dlq;
            };

            match self
                .orders
                .update_status(&payload.order_id, OrderStatus::Confirmed)
                .await
            {
                Ok(updated) => {
                    if !updated {
                        tracing::warn!(
                            order_id = payload.order_id.as_str(),
                            "inventory.reserve.approved for an unknown order id"
                        );
                    }
                },
                Err(err) => {
                    tracing::warn!(error = %err, "failed to confirm order, retrying");
                    return Decision::Retry;
                },
            }

            match self.events.append(envelope).await {
                Ok(()) => Decision::Ack,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to append inventory.reserve.approved, retrying");
                    Decision::Retry
                },
            }
        })
    }
}

/// Rejects the order named in an `inventory.reserve.rejected` event.
pub struct ReserveRejectedHandler {
    pub orders: Arc<dyn OrderRepository>,
    pub events: Arc<dyn EventStore>,
}

impl EventHandler for ReserveRejectedHandler {
    fn handle<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Decision> + Send + 'a>> {
        Box::pin(async move {
            let Payload::InventoryReserveRejected(payload) = &envelope.payload else {
                tracing::error!(event_type = %envelope.event_type, "handler bound to the wrong payload type");
                return Decision::Dlq;
            };

            match self
                .orders
                .update_status(&payload.order_id, OrderStatus::Rejected)
                .await
            {
                Ok(updated) => {
                    if !updated {
                        tracing::warn!(
                            order_id = payload.order_id.as_str(),
                            "inventory.reserve.rejected for an unknown order id"
                        );
                    }
                },
                Err(err) => {
                    tracing::warn!(error = %err, "failed to reject order, retrying");
                    return Decision::Retry;
                },
            }

            match self.events.append(envelope).await {
                Ok(()) => Decision::Ack,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to append inventory.reserve.rejected, retrying");
                    Decision::Retry
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderflow_core::envelope::{InventoryReserveApprovedPayload, InventoryReserveRejectedPayload};
    use orderflow_core::CorrelationId;
    use orderflow_testing::{InMemoryEventStore, InMemoryOrderRepository};

    fn approved_envelope(order_id: &str) -> Envelope {
        Envelope::new(
            "inventory.reserve.approved",
            1,
            "inventory-service",
            CorrelationId::new(),
            Payload::InventoryReserveApproved(InventoryReserveApprovedPayload {
                order_id: order_id.to_string().into(),
                reservation_id: "res_1".to_string(),
            }),
        )
    }

    fn rejected_envelope(order_id: &str) -> Envelope {
        Envelope::new(
            "inventory.reserve.rejected",
            1,
            "inventory-service",
            CorrelationId::new(),
            Payload::InventoryReserveRejected(InventoryReserveRejectedPayload {
                order_id: order_id.to_string().into(),
                reason: "insufficient_stock".to_string(),
            }),
        )
    }

    #[tokio::test]
    async fn approved_confirms_an_existing_order() {
        let orders: Arc<dyn OrderRepository> = Arc::new(InMemoryOrderRepository::new());
        let events: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        let order_id = "ord_1".to_string().into();
        orders.create(&order_id, "cust_1", &[], 0.0).await.unwrap();

        let handler = ReserveApprovedHandler {
            orders: orders.clone(),
            events: events.clone(),
        };
        let envelope = approved_envelope("ord_1");
        let decision = handler.handle(&envelope).await;
        assert_eq!(decision, Decision::Ack);

        let order = orders.find(&order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);

        let stored = events.find_by_event_id(envelope.event_id).await.unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn rejected_is_non_fatal_for_an_unknown_order() {
        let orders: Arc<dyn OrderRepository> = Arc::new(InMemoryOrderRepository::new());
        let events: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        let handler = ReserveRejectedHandler { orders, events: events.clone() };
        let envelope = rejected_envelope("ord_missing");
        let decision = handler.handle(&envelope).await;
        assert_eq!(decision, Decision::Ack);

        let stored = events.find_by_event_id(envelope.event_id).await.unwrap();
        assert!(stored.is_some());
    }
}

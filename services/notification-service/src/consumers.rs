//! A single handler shape reused across all four notification-triggering
//! queues: append the triggering event, then construct and publish the
//! corresponding `notification.sent` event (spec §4.4.3).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use orderflow_amqp::topology::EXCHANGE_NOTIFICATIONS;
use orderflow_core::envelope::{NotificationKind, NotificationSentPayload};
use orderflow_core::{
    CorrelationId, Decision, Envelope, EventHandler, EventStore, MessageBus, MessageHeaders,
    OrderId, Payload, SchemaRegistry,
};
use tracing::error;

const ROUTING_KEY: &str = "notification.sent.v1";
const CHANNEL: &str = "log";

/// Turns one triggering event into a `notification.sent` event of a fixed
/// [`NotificationKind`]. One instance is bound per queue.
pub struct NotificationHandler {
    pub events: Arc<dyn EventStore>,
    pub bus: Arc<dyn MessageBus>,
    pub registry: SchemaRegistry,
    pub producer: String,
    pub kind: NotificationKind,
}

impl EventHandler for NotificationHandler {
    fn handle<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Decision> + Send + 'a>> {
        Box::pin(async move {
            let Some(order_id) = envelope.order_id().map(str::to_string) else {
                error!(event_id = %envelope.event_id, "event has no orderId, cannot notify");
                return Decision::Dlq;
            };

            if let Err(err) = self.events.append(envelope).await {
                error!(error = %err, "failed to append triggering event, retrying");
                return Decision::Retry;
            }

            let notification = Envelope::new(
                "notification.sent",
                1,
                self.producer.clone(),
                CorrelationId::from(envelope.correlation_id.as_str().to_string()),
                Payload::NotificationSent(NotificationSentPayload {
                    order_id: OrderId::from(order_id),
                    kind: self.kind,
                    channel: CHANNEL.to_string(),
                }),
            );

            if self.registry.validate_outgoing(&notification).is_err() {
                error!(event_id = %notification.event_id, "constructed an invalid notification envelope");
                return Decision::Dlq;
            }
            if let Err(err) = self.events.append(&notification).await {
                error!(error = %err, "failed to append notification event, retrying");
                return Decision::Retry;
            }

            let raw = notification.to_raw();
            let headers = MessageHeaders::for_envelope(&notification);
            match self.bus.publish(EXCHANGE_NOTIFICATIONS, ROUTING_KEY, &raw, &headers).await {
                Ok(()) => Decision::Ack,
                Err(err) => {
                    error!(error = %err, "failed to publish notification, retrying");
                    Decision::Retry
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderflow_core::envelope::OrdersCreatedPayload;
    use orderflow_testing::event_store::InMemoryEventStore;
    use orderflow_testing::message_bus::InMemoryMessageBus;

    fn created_envelope() -> Envelope {
        Envelope::new(
            "orders.created",
            1,
            "order-service",
            CorrelationId::new(),
            Payload::OrdersCreated(OrdersCreatedPayload {
                order_id: OrderId::from("ord_1".to_string()),
                customer_id: "cust_1".to_string(),
                items: vec![],
                total: 1.0,
            }),
        )
    }

    #[tokio::test]
    async fn publishes_notification_sent_with_mapped_kind() {
        let events = Arc::new(InMemoryEventStore::new());
        let bus = Arc::new(InMemoryMessageBus::new());
        let handler = NotificationHandler {
            events: events.clone(),
            bus: bus.clone(),
            registry: SchemaRegistry,
            producer: "notification-service".to_string(),
            kind: NotificationKind::OrderCreated,
        };

        let decision = handler.handle(&created_envelope()).await;

        assert_eq!(decision, Decision::Ack);
        assert_eq!(events.all().len(), 2);
        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].exchange, EXCHANGE_NOTIFICATIONS);
        assert_eq!(published[0].routing_key, ROUTING_KEY);
    }
}

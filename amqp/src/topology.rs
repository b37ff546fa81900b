//! Declares the six topic exchanges and the primary/retry/dlq queue triads
//! every service binds to (spec §4.2, §6).
//!
//! Each logical queue `Q` becomes three durable queues: `Q` (primary), `Q.retry`
//! (TTL ≈ 10s, dead-letter-exchange pointing back at the owning primary
//! exchange with `Q`'s routing key), and `Q.dlq` (terminal, never consumed by
//! application code). A message rejected by a handler is republished to
//! `Q.retry`; once its TTL elapses the broker dead-letters it back onto the
//! primary exchange, which re-delivers it to `Q`.

use std::time::Duration;

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{Channel, ExchangeKind};
use thiserror::Error;

/// Primary topic exchanges (spec §4.2).
pub const EXCHANGE_ORDERS: &str = "orders";
pub const EXCHANGE_INVENTORY: &str = "inventory";
pub const EXCHANGE_NOTIFICATIONS: &str = "notifications";

/// The retry exchange paired with each primary exchange.
pub const EXCHANGE_ORDERS_RETRY: &str = "orders.retry";
pub const EXCHANGE_INVENTORY_RETRY: &str = "inventory.retry";
pub const EXCHANGE_NOTIFICATIONS_RETRY: &str = "notifications.retry";

/// How long a rejected message sits in its retry queue before the broker
/// dead-letters it back onto the primary exchange (spec §4.2).
pub const RETRY_TTL: Duration = Duration::from_secs(10);

/// Errors declaring topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("failed to declare exchange {exchange}: {reason}")]
    Exchange { exchange: String, reason: String },

    #[error("failed to declare queue {queue}: {reason}")]
    Queue { queue: String, reason: String },

    #[error("failed to bind queue {queue} to {exchange}/{routing_key}: {reason}")]
    Bind {
        queue: String,
        exchange: String,
        routing_key: String,
        reason: String,
    },
}

/// One logical queue this system binds: its primary exchange, the retry
/// exchange paired with it, and the routing key it listens on.
#[derive(Debug, Clone, Copy)]
pub struct QueueBinding {
    pub queue: &'static str,
    pub exchange: &'static str,
    pub retry_exchange: &'static str,
    pub routing_key: &'static str,
}

/// Every queue this system declares at startup (spec §6 broker topology table).
///
/// `notification.sent.q` is declared (and published to) even though no
/// consumer in this system binds to it today — it is the terminal event of
/// the flow, kept available for future audit/analytics consumers.
pub const QUEUE_BINDINGS: &[QueueBinding] = &[
    QueueBinding {
        queue: "order.created.q",
        exchange: EXCHANGE_ORDERS,
        retry_exchange: EXCHANGE_ORDERS_RETRY,
        routing_key: "orders.created.v1",
    },
    QueueBinding {
        queue: "orders.cancelled.q",
        exchange: EXCHANGE_ORDERS,
        retry_exchange: EXCHANGE_ORDERS_RETRY,
        routing_key: "orders.cancelled.v1",
    },
    QueueBinding {
        queue: "orders.created.notification.q",
        exchange: EXCHANGE_ORDERS,
        retry_exchange: EXCHANGE_ORDERS_RETRY,
        routing_key: "orders.created.v1",
    },
    QueueBinding {
        queue: "orders.cancelled.notification.q",
        exchange: EXCHANGE_ORDERS,
        retry_exchange: EXCHANGE_ORDERS_RETRY,
        routing_key: "orders.cancelled.v1",
    },
    QueueBinding {
        queue: "inventory.reserve.approved.q",
        exchange: EXCHANGE_INVENTORY,
        retry_exchange: EXCHANGE_INVENTORY_RETRY,
        routing_key: "inventory.reserve.approved.v1",
    },
    QueueBinding {
        queue: "inventory.reserve.approved.notification.q",
        exchange: EXCHANGE_INVENTORY,
        retry_exchange: EXCHANGE_INVENTORY_RETRY,
        routing_key: "inventory.reserve.approved.v1",
    },
    QueueBinding {
        queue: "inventory.reserve.rejected.q",
        exchange: EXCHANGE_INVENTORY,
        retry_exchange: EXCHANGE_INVENTORY_RETRY,
        routing_key: "inventory.reserve.rejected.v1",
    },
    QueueBinding {
        queue: "inventory.reserve.rejected.notification.q",
        exchange: EXCHANGE_INVENTORY,
        retry_exchange: EXCHANGE_INVENTORY_RETRY,
        routing_key: "inventory.reserve.rejected.v1",
    },
    QueueBinding {
        queue: "notification.sent.q",
        exchange: EXCHANGE_NOTIFICATIONS,
        retry_exchange: EXCHANGE_NOTIFICATIONS_RETRY,
        routing_key: "notification.sent.v1",
    },
];

/// `inventory.reserve.requested.v1` is reserved in the routing table but has
/// no producer in this system; kept as a documented, never-published constant
/// (spec §9 Open Question resolution).
pub const RESERVED_ROUTING_KEY_INVENTORY_RESERVE_REQUESTED: &str =
    "inventory.reserve.requested.v1";

/// The dead-letter queue name for a primary queue, e.g. `order.created.q.dlq`.
#[must_use]
pub fn dlq_name(queue: &str) -> String {
    format!("{queue}.dlq")
}

/// The retry queue name for a primary queue, e.g. `order.created.q.retry`.
#[must_use]
pub fn retry_queue_name(queue: &str) -> String {
    format!("{queue}.retry")
}

/// Declare every exchange and queue triad on `channel`. Idempotent: safe to
/// call on every service startup.
///
/// # Errors
///
/// Returns [`TopologyError`] if any declare or bind call is rejected by the broker.
pub async fn declare_topology(channel: &Channel) -> Result<(), TopologyError> {
    for exchange in [
        EXCHANGE_ORDERS,
        EXCHANGE_INVENTORY,
        EXCHANGE_NOTIFICATIONS,
        EXCHANGE_ORDERS_RETRY,
        EXCHANGE_INVENTORY_RETRY,
        EXCHANGE_NOTIFICATIONS_RETRY,
    ] {
        declare_exchange(channel, exchange).await?;
    }

    for binding in QUEUE_BINDINGS {
        declare_queue_triad(channel, binding).await?;
    }

    Ok(())
}

async fn declare_exchange(channel: &Channel, exchange: &str) -> Result<(), TopologyError> {
    channel
        .exchange_declare(
            exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| TopologyError::Exchange {
            exchange: exchange.to_string(),
            reason: e.to_string(),
        })
}

async fn declare_queue_triad(channel: &Channel, binding: &QueueBinding) -> Result<(), TopologyError> {
    let dlq = dlq_name(binding.queue);
    channel
        .queue_declare(
            &dlq,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| TopologyError::Queue {
            queue: dlq.clone(),
            reason: e.to_string(),
        })?;

    let retry_queue = retry_queue_name(binding.queue);
    let mut retry_args = FieldTable::default();
    retry_args.insert(
        ShortString::from("x-message-ttl"),
        AMQPValue::LongUInt(u32::try_from(RETRY_TTL.as_millis()).unwrap_or(u32::MAX)),
    );
    retry_args.insert(
        ShortString::from("x-dead-letter-exchange"),
        AMQPValue::LongString(LongString::from(binding.exchange)),
    );
    retry_args.insert(
        ShortString::from("x-dead-letter-routing-key"),
        AMQPValue::LongString(LongString::from(binding.routing_key)),
    );
    channel
        .queue_declare(
            &retry_queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            retry_args,
        )
        .await
        .map_err(|e| TopologyError::Queue {
            queue: retry_queue.clone(),
            reason: e.to_string(),
        })?;
    channel
        .queue_bind(
            &retry_queue,
            binding.retry_exchange,
            binding.queue,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| TopologyError::Bind {
            queue: retry_queue.clone(),
            exchange: binding.retry_exchange.to_string(),
            routing_key: binding.queue.to_string(),
            reason: e.to_string(),
        })?;

    channel
        .queue_declare(
            binding.queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| TopologyError::Queue {
            queue: binding.queue.to_string(),
            reason: e.to_string(),
        })?;
    channel
        .queue_bind(
            binding.queue,
            binding.exchange,
            binding.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| TopologyError::Bind {
            queue: binding.queue.to_string(),
            exchange: binding.exchange.to_string(),
            routing_key: binding.routing_key.to_string(),
            reason: e.to_string(),
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dlq_and_retry_names_are_suffixed() {
        assert_eq!(dlq_name("order.created.q"), "order.created.q.dlq");
        assert_eq!(retry_queue_name("order.created.q"), "order.created.q.retry");
    }

    #[test]
    fn every_binding_points_at_a_declared_retry_exchange() {
        for binding in QUEUE_BINDINGS {
            assert!(matches!(
                binding.retry_exchange,
                EXCHANGE_ORDERS_RETRY | EXCHANGE_INVENTORY_RETRY | EXCHANGE_NOTIFICATIONS_RETRY
            ));
        }
    }

    #[test]
    fn reserved_routing_key_is_not_in_any_binding() {
        assert!(QUEUE_BINDINGS
            .iter()
            .all(|b| b.routing_key != RESERVED_ROUTING_KEY_INVENTORY_RESERVE_REQUESTED));
    }
}

//! Broker-sourced dead-letter queue depth inspection (spec §10.6).
//!
//! `GET /internal/dlq-depth` reads these counts directly off RabbitMQ via a
//! passive `queue.declare` rather than from anything stored in `Postgres` —
//! depth is a property of the broker's queue, not of this service's own state.

use std::collections::HashMap;

use lapin::options::QueueDeclareOptions;
use lapin::types::FieldTable;
use lapin::Channel;
use orderflow_amqp::topology::dlq_name;
use thiserror::Error;

/// The queues the order service consumes from; their `.dlq` depth is what this
/// endpoint reports.
pub const OWNED_QUEUES: &[&str] = &[
    "inventory.reserve.approved.q",
    "inventory.reserve.rejected.q",
];

/// Errors inspecting a dead-letter queue.
#[derive(Debug, Error)]
pub enum DlqDepthError {
    #[error("failed to inspect dead-letter queue {queue}: {reason}")]
    Inspect { queue: String, reason: String },
}

/// Passively declare each owned queue's `.dlq` and report its message count.
///
/// # Errors
///
/// Returns [`DlqDepthError`] if the broker rejects the passive declare (e.g.
/// the channel has gone stale).
pub async fn dlq_depths(channel: &Channel) -> Result<HashMap<String, u32>, DlqDepthError> {
    let mut depths = HashMap::new();
    for queue in OWNED_QUEUES {
        let dlq = dlq_name(queue);
        let declared = channel
            .queue_declare(
                &dlq,
                QueueDeclareOptions {
                    passive: true,
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| DlqDepthError::Inspect {
                queue: dlq.clone(),
                reason: e.to_string(),
            })?;
        depths.insert(dlq, declared.message_count());
    }
    Ok(depths)
}

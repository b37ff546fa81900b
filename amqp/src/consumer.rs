//! The consumer runtime: pulls deliveries off one queue, validates them
//! against the schema registry, and drives a registered [`EventHandler`]
//! through the ack/retry/dlq decision (spec §4.2 consume/ack algorithm).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::{FutureExt, StreamExt};
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, BasicRejectOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongString};
use lapin::{BasicProperties, Channel};
use orderflow_core::{Decision, Envelope, EventHandler, SchemaRegistry};
use orderflow_runtime::metrics::MessageBusMetrics;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::topology::dlq_name;

/// Header carrying this delivery's 1-indexed attempt number (spec §4.2, §8
/// property 5: a handler that always fails causes exactly `maxRetries`
/// redeliveries, then one DLQ appearance with `x-attempt = maxRetries + 1`).
pub const HEADER_ATTEMPT: &str = "x-attempt";

/// Errors standing up a consumer loop.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("failed to set QoS: {0}")]
    Qos(String),

    #[error("failed to start consuming {queue}: {reason}")]
    Consume { queue: String, reason: String },
}

/// Static configuration for one bound queue's consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Number of unacked deliveries the broker may have in flight at once.
    /// Default 1 (spec §5): yields effectively serial per-queue processing.
    pub prefetch: u16,
    /// Attempts (including the first) allowed before a retryable failure is
    /// routed to the DLQ instead of the retry queue.
    pub max_attempts: u32,
    /// Routing key this queue is bound to on its primary exchange — also the
    /// key retried messages are republished with onto the retry exchange.
    pub routing_key: String,
    /// The retry exchange messages are republished to on `Decision::Retry`.
    pub retry_exchange: String,
}

/// Run a consumer loop against `queue` until the channel closes.
///
/// For every delivery: parse JSON, validate against `registry`. A schema
/// failure is never retried — it is acked and the raw bytes are published
/// straight to the queue's DLQ (spec §4.2 step 2, §7). A valid envelope goes
/// to `handler`; its [`Decision`] (or a caught panic, treated as `Retry`)
/// drives ack/retry/dlq.
///
/// # Errors
///
/// Returns [`ConsumerError`] if QoS or `basic_consume` setup fails. Per-message
/// failures are handled internally and never stop the loop.
pub async fn run_consumer(
    channel: Channel,
    queue: &str,
    registry: SchemaRegistry,
    handler: Arc<dyn EventHandler>,
    config: ConsumerConfig,
) -> Result<(), ConsumerError> {
    channel
        .basic_qos(config.prefetch, BasicQosOptions::default())
        .await
        .map_err(|e| ConsumerError::Qos(e.to_string()))?;

    let consumer_tag = format!("{queue}-consumer");
    let mut consumer = channel
        .basic_consume(
            queue,
            &consumer_tag,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| ConsumerError::Consume {
            queue: queue.to_string(),
            reason: e.to_string(),
        })?;

    info!(queue, prefetch = config.prefetch, "consumer started");

    while let Some(delivery) = consumer.next().await {
        let Ok(delivery) = delivery else {
            warn!(queue, "delivery stream yielded an error, skipping");
            continue;
        };

        let attempt = attempt_from_properties(&delivery.properties);
        let started = Instant::now();

        let raw: Result<orderflow_core::EnvelopeRaw, _> = serde_json::from_slice(&delivery.data);
        let Ok(raw) = raw else {
            warn!(queue, "delivery body is not a valid envelope, dead-lettering");
            MessageBusMetrics::record_schema_rejection();
            publish_to_dlq(&channel, queue, &delivery.data, delivery.properties.clone()).await;
            let _ = delivery.ack(BasicAckOptions::default()).await;
            continue;
        };

        let envelope = match registry.validate_incoming(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(queue, error = %err, "schema validation failed, dead-lettering");
                MessageBusMetrics::record_schema_rejection();
                publish_to_dlq(&channel, queue, &delivery.data, delivery.properties.clone())
                    .await;
                let _ = delivery.ack(BasicAckOptions::default()).await;
                continue;
            },
        };

        let decision = dispatch(&handler, &envelope).await;
        MessageBusMetrics::record_consume(started.elapsed());

        match decision {
            Decision::Ack => {
                MessageBusMetrics::record_ack();
                let _ = delivery.ack(BasicAckOptions::default()).await;
            },
            Decision::Retry if attempt < config.max_attempts => {
                MessageBusMetrics::record_retry();
                republish_for_retry(
                    &channel,
                    &config.retry_exchange,
                    queue,
                    &delivery.data,
                    delivery.properties.clone(),
                    attempt + 1,
                )
                .await;
                let _ = delivery.ack(BasicAckOptions::default()).await;
            },
            Decision::Retry | Decision::Dlq => {
                if matches!(decision, Decision::Retry) {
                    warn!(queue, attempt, "retry budget exhausted, dead-lettering");
                }
                MessageBusMetrics::record_dead_lettered();
                publish_to_dlq(&channel, queue, &delivery.data, delivery.properties.clone())
                    .await;
                let _ = delivery.ack(BasicAckOptions::default()).await;
            },
        }
    }

    Ok(())
}

/// Call `handler.handle`, catching a panic and treating it as `Decision::Retry`
/// (spec §4.2 step 5: any unhandled failure is a retry, never a crash of the
/// consumer loop).
async fn dispatch(handler: &Arc<dyn EventHandler>, envelope: &Envelope) -> Decision {
    match AssertUnwindSafe(handler.handle(envelope)).catch_unwind().await {
        Ok(decision) => decision,
        Err(_) => {
            error!(event_id = %envelope.event_id, "handler panicked, treating as retry");
            Decision::Retry
        },
    }
}

fn attempt_from_properties(properties: &BasicProperties) -> u32 {
    properties
        .headers()
        .as_ref()
        .and_then(|headers| headers.inner().get(HEADER_ATTEMPT))
        .and_then(|value| match value {
            AMQPValue::LongString(s) => s.as_str().parse().ok(),
            AMQPValue::LongUInt(n) => Some(*n),
            _ => None,
        })
        .unwrap_or(1)
}

async fn republish_for_retry(
    channel: &Channel,
    retry_exchange: &str,
    routing_key: &str,
    body: &[u8],
    mut properties: BasicProperties,
    next_attempt: u32,
) {
    let mut headers = properties.headers().clone().unwrap_or_default();
    headers.insert(
        HEADER_ATTEMPT.into(),
        AMQPValue::LongString(LongString::from(next_attempt.to_string())),
    );
    properties = properties.with_headers(headers);

    if let Err(err) = channel
        .basic_publish(
            retry_exchange,
            routing_key,
            BasicPublishOptions::default(),
            body,
            properties,
        )
        .await
    {
        error!(retry_exchange, routing_key, error = %err, "failed to republish to retry exchange");
    }
}

async fn publish_to_dlq(channel: &Channel, queue: &str, body: &[u8], properties: BasicProperties) {
    let dlq = dlq_name(queue);
    // DLQs are not bound to any exchange; publish directly via the default
    // exchange, where the routing key is taken as the destination queue name.
    if let Err(err) = channel
        .basic_publish("", &dlq, BasicPublishOptions::default(), body, properties)
        .await
    {
        error!(dlq, error = %err, "failed to publish to dead-letter queue");
    }
}

/// Reject (without requeue) a raw delivery this process cannot parse at all,
/// e.g. if even acking failed. Exposed for callers building custom recovery
/// paths; the main loop above prefers ack + DLQ publish over reject, since a
/// reject gives no record of the failure.
pub async fn reject_without_requeue(channel: &Channel, delivery_tag: u64) {
    if let Err(err) = channel
        .basic_reject(delivery_tag, BasicRejectOptions { requeue: false })
        .await
    {
        error!(delivery_tag, error = %err, "failed to reject delivery");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_defaults_to_one_without_header() {
        let properties = BasicProperties::default();
        assert_eq!(attempt_from_properties(&properties), 1);
    }
}

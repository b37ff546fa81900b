//! The [`MessageBus`] implementation: publishes persistent, `application/json`
//! messages with the headers every consumer expects, guarded by a circuit
//! breaker so a wedged broker fails fast instead of blocking a service
//! (spec §4.2 publish contract, §5 concurrency model).

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use lapin::options::BasicPublishOptions;
use lapin::types::{AMQPValue, FieldTable, LongString};
use lapin::{BasicProperties, Channel};
use orderflow_core::{EnvelopeRaw, MessageBus, MessageBusError, MessageHeaders};
use orderflow_runtime::metrics::MessageBusMetrics;
use orderflow_runtime::{CircuitBreaker, CircuitBreakerError};

/// Publishes envelopes onto a RabbitMQ channel.
///
/// Holds a single `lapin::Channel`; callers needing concurrent publishes from
/// multiple tasks should wrap this in a connection-pooled channel source
/// (`deadpool-lapin`) rather than sharing one `Channel` across tasks, since a
/// channel multiplexes one in-flight operation at a time on the wire.
pub struct AmqpMessageBus {
    channel: Channel,
    breaker: CircuitBreaker,
}

impl AmqpMessageBus {
    /// Wrap `channel`, guarding every publish with `breaker`.
    #[must_use]
    pub fn new(channel: Channel, breaker: CircuitBreaker) -> Self {
        Self { channel, breaker }
    }

    fn properties(headers: &MessageHeaders) -> BasicProperties {
        let mut table = FieldTable::default();
        for (key, value) in headers.as_map() {
            table.insert(key.into(), AMQPValue::LongString(LongString::from(value)));
        }
        BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2) // persistent
            .with_headers(table)
    }
}

impl MessageBus for AmqpMessageBus {
    fn publish<'a>(
        &'a self,
        exchange: &'a str,
        routing_key: &'a str,
        raw: &'a EnvelopeRaw,
        headers: &'a MessageHeaders,
    ) -> Pin<Box<dyn Future<Output = Result<(), MessageBusError>> + Send + 'a>> {
        Box::pin(async move {
            let body = serde_json::to_vec(raw).map_err(|e| MessageBusError::PublishFailed {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                reason: e.to_string(),
            })?;
            let properties = Self::properties(headers);

            let started = Instant::now();
            let result = self
                .breaker
                .call(|| async {
                    self.channel
                        .basic_publish(
                            exchange,
                            routing_key,
                            BasicPublishOptions::default(),
                            &body,
                            properties.clone(),
                        )
                        .await
                        .map_err(|e| e.to_string())?
                        .await
                        .map_err(|e| e.to_string())
                })
                .await;

            match result {
                Ok(_confirmation) => {
                    MessageBusMetrics::record_publish(started.elapsed());
                    Ok(())
                },
                Err(CircuitBreakerError::Open) => {
                    MessageBusMetrics::record_publish_error();
                    Err(MessageBusError::ConnectionFailed(
                        "circuit breaker open".to_string(),
                    ))
                },
                Err(CircuitBreakerError::Inner(reason)) => {
                    MessageBusMetrics::record_publish_error();
                    Err(MessageBusError::PublishFailed {
                        exchange: exchange.to_string(),
                        routing_key: routing_key.to_string(),
                        reason,
                    })
                },
            }
        })
    }
}

//! RabbitMQ messaging substrate: topology declaration, a [`orderflow_core::MessageBus`]
//! producer, and a consumer runtime that drives registered handlers through
//! the ack/retry/dlq contract (spec §4.2).
//!
//! Connections are pooled with `deadpool-lapin`; each service checks out a
//! channel per publish and holds one dedicated channel per consumer loop, the
//! same split the broker's prefetch-based flow control assumes.

pub mod consumer;
pub mod producer;
pub mod topology;

pub use consumer::{run_consumer, ConsumerConfig, ConsumerError};
pub use producer::AmqpMessageBus;
pub use topology::{declare_topology, QueueBinding, TopologyError, QUEUE_BINDINGS};

use deadpool_lapin::{Config as PoolConfig, Pool, Runtime};
use thiserror::Error;

/// Errors establishing the broker connection pool.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to build connection pool: {0}")]
    PoolBuild(String),

    #[error("failed to check out a connection: {0}")]
    CheckOut(String),

    #[error("failed to open a channel: {0}")]
    Channel(String),
}

/// Build a `deadpool-lapin` connection pool for `amqp_url`.
///
/// # Errors
///
/// Returns [`ConnectionError::PoolBuild`] if the pool cannot be constructed.
pub fn build_pool(amqp_url: &str) -> Result<Pool, ConnectionError> {
    let mut cfg = PoolConfig::default();
    cfg.url = Some(amqp_url.to_string());
    cfg.pool = None;
    cfg.build(Some(Runtime::Tokio1))
        .map_err(|e| ConnectionError::PoolBuild(e.to_string()))
}

/// Check out a connection from `pool` and open a fresh channel on it.
///
/// # Errors
///
/// Returns [`ConnectionError`] if checkout or channel creation fails.
pub async fn open_channel(pool: &Pool) -> Result<lapin::Channel, ConnectionError> {
    let connection = pool
        .get()
        .await
        .map_err(|e| ConnectionError::CheckOut(e.to_string()))?;
    connection
        .create_channel()
        .await
        .map_err(|e| ConnectionError::Channel(e.to_string()))
}

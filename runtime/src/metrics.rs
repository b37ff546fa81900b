//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the pieces of the runtime every
//! service links:
//! - Event store operations
//! - Message bus publish/consume
//! - Circuit breaker state
//! - Retry attempts
//!
//! # Example
//!
//! ```rust,no_run
//! use orderflow_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Start metrics server on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start().await?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
    /// Failed to bind HTTP server
    #[error("Failed to bind metrics server: {0}")]
    Bind(#[from] std::io::Error),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Initialize metrics and start the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns error if metrics exporter cannot be installed or server cannot bind.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this will fail
    /// with `MetricsError::Install`. In production, ensure this is only called once.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Event store metrics
    describe_counter!(
        "event_store_events_appended_total",
        "Total number of events appended to the event store"
    );
    describe_counter!(
        "event_store_duplicate_appends_total",
        "Total number of appends that were no-ops due to a duplicate event id"
    );
    describe_counter!(
        "event_store_queries_total",
        "Total number of filtered scans run against the event store"
    );
    describe_histogram!(
        "event_store_append_duration_seconds",
        "Time taken to append an event"
    );
    describe_histogram!(
        "event_store_query_duration_seconds",
        "Time taken to run a filtered scan"
    );

    // Message bus metrics
    describe_counter!(
        "message_bus_messages_published_total",
        "Total number of messages published"
    );
    describe_counter!(
        "message_bus_messages_consumed_total",
        "Total number of messages delivered to a handler"
    );
    describe_counter!(
        "message_bus_publish_errors_total",
        "Total number of publish errors"
    );
    describe_counter!(
        "message_bus_schema_rejections_total",
        "Total number of messages rejected by schema validation"
    );
    describe_counter!(
        "message_bus_acks_total",
        "Total number of messages acknowledged by a handler"
    );
    describe_counter!(
        "message_bus_retries_total",
        "Total number of messages redelivered via a retry queue"
    );
    describe_counter!(
        "message_bus_dead_lettered_total",
        "Total number of messages routed to a dead-letter queue"
    );
    describe_histogram!(
        "message_bus_publish_duration_seconds",
        "Time taken to publish a message"
    );
    describe_histogram!(
        "message_bus_handle_duration_seconds",
        "Time taken for a handler to process one delivery"
    );

    // Circuit breaker metrics
    describe_gauge!(
        "circuit_breaker_state",
        "Current circuit breaker state (0=closed, 1=half-open, 2=open)"
    );
    describe_counter!(
        "circuit_breaker_calls_total",
        "Total number of calls through circuit breaker"
    );
    describe_counter!(
        "circuit_breaker_successes_total",
        "Total number of successful calls"
    );
    describe_counter!(
        "circuit_breaker_failures_total",
        "Total number of failed calls"
    );
    describe_counter!(
        "circuit_breaker_rejections_total",
        "Total number of rejected calls (circuit open)"
    );

    // Retry metrics
    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!("retry_successes_total", "Total number of successful retries");
    describe_counter!(
        "retry_exhausted_total",
        "Total number of retry attempts that exhausted max retries"
    );
}

/// Event store metrics recorder.
pub struct EventStoreMetrics;

impl EventStoreMetrics {
    /// Record a successful append.
    pub fn record_append(duration: Duration) {
        counter!("event_store_events_appended_total").increment(1);
        histogram!("event_store_append_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an append that was a no-op because `event_id` already existed.
    pub fn record_duplicate_append() {
        counter!("event_store_duplicate_appends_total").increment(1);
    }

    /// Record a filtered scan.
    pub fn record_query(result_count: usize, duration: Duration) {
        counter!("event_store_queries_total").increment(1);
        histogram!("event_store_query_duration_seconds").record(duration.as_secs_f64());
        let _ = result_count;
    }
}

/// Message bus metrics recorder.
pub struct MessageBusMetrics;

impl MessageBusMetrics {
    /// Record a successful publish.
    pub fn record_publish(duration: Duration) {
        counter!("message_bus_messages_published_total").increment(1);
        histogram!("message_bus_publish_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a publish error.
    pub fn record_publish_error() {
        counter!("message_bus_publish_errors_total").increment(1);
    }

    /// Record a delivery handed to a handler, and how long handling took.
    pub fn record_consume(duration: Duration) {
        counter!("message_bus_messages_consumed_total").increment(1);
        histogram!("message_bus_handle_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a delivery rejected by schema validation (routed straight to DLQ).
    pub fn record_schema_rejection() {
        counter!("message_bus_schema_rejections_total").increment(1);
    }

    /// Record a handler's `Decision::Ack`.
    pub fn record_ack() {
        counter!("message_bus_acks_total").increment(1);
    }

    /// Record a handler's `Decision::Retry` (redelivered via the retry queue).
    pub fn record_retry() {
        counter!("message_bus_retries_total").increment(1);
    }

    /// Record a delivery routed to a dead-letter queue.
    pub fn record_dead_lettered() {
        counter!("message_bus_dead_lettered_total").increment(1);
    }
}

/// Circuit breaker metrics recorder.
pub struct CircuitBreakerMetrics;

impl CircuitBreakerMetrics {
    /// Record circuit breaker state.
    ///
    /// 0 = Closed, 1 = `HalfOpen`, 2 = Open
    pub fn record_state(state: f64) {
        gauge!("circuit_breaker_state").set(state);
    }

    /// Record a call attempt.
    pub fn record_call() {
        counter!("circuit_breaker_calls_total").increment(1);
    }

    /// Record a successful call.
    pub fn record_success() {
        counter!("circuit_breaker_successes_total").increment(1);
    }

    /// Record a failed call.
    pub fn record_failure() {
        counter!("circuit_breaker_failures_total").increment(1);
    }

    /// Record a rejected call (circuit open).
    pub fn record_rejection() {
        counter!("circuit_breaker_rejections_total").increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
    }

    #[tokio::test]
    async fn test_metrics_server_start() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);

        let result = server.start();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_metrics_server_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);

        server.start().unwrap();

        EventStoreMetrics::record_append(Duration::from_millis(100));
        MessageBusMetrics::record_publish(Duration::from_millis(50));

        if let Some(rendered) = server.render() {
            assert!(rendered.contains("event_store_events_appended_total"));
            assert!(rendered.contains("message_bus_messages_published_total"));
        }
    }

    #[tokio::test]
    async fn test_event_store_metrics() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        EventStoreMetrics::record_append(Duration::from_millis(200));
        EventStoreMetrics::record_duplicate_append();
        EventStoreMetrics::record_query(5, Duration::from_millis(100));

        if let Some(rendered) = server.render() {
            assert!(rendered.contains("event_store_events_appended_total"));
            assert!(rendered.contains("event_store_duplicate_appends_total"));
            assert!(rendered.contains("event_store_queries_total"));
        }
    }

    #[tokio::test]
    async fn test_circuit_breaker_metrics() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        CircuitBreakerMetrics::record_state(0.0); // Closed
        CircuitBreakerMetrics::record_call();
        CircuitBreakerMetrics::record_success();

        if let Some(rendered) = server.render() {
            assert!(rendered.contains("circuit_breaker_state"));
            assert!(rendered.contains("circuit_breaker_calls_total"));
        }
    }
}

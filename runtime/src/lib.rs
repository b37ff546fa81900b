//! Shared runtime primitives used by every orderflow service:
//! circuit breaking, retry with backoff, and Prometheus metrics registration.
//!
//! This crate does not know about the event envelope, the broker, or any
//! storage backend — it is pure operational plumbing, reused unchanged
//! across `order-service`, `inventory-service`, and `notification-service`.

pub mod circuit_breaker;
pub mod metrics;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, State};
pub use retry::{retry_with_backoff, retry_with_predicate, RetryPolicy};

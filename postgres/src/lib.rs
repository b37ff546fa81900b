//! `PostgreSQL`-backed storage for orderflow: the event log, the order
//! aggregate read-model, and the HTTP idempotency map (spec §10).
//!
//! Each service owns its own database; the schema each module assumes is
//! documented in its module-level doc comment. Connection pooling is left to
//! the caller (`sqlx::PgPool::connect` or a pre-built pool), since pool
//! lifecycle belongs to the service's startup sequence, not this crate.
//!
//! # Example
//!
//! ```ignore
//! use orderflow_postgres::PgEventStore;
//! use orderflow_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use sqlx::PgPool;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = PgPool::connect("postgres://localhost/orderflow").await?;
//!     let breaker = CircuitBreaker::new(CircuitBreakerConfig::builder().build());
//!     let event_store = PgEventStore::new(pool, breaker);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod event_store;
pub mod idempotency;
pub mod orders;

pub use event_store::PgEventStore;
pub use idempotency::PgIdempotencyStore;
pub use orders::PgOrderRepository;

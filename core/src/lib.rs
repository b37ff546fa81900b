//! Core types for the orderflow event-routing core.
//!
//! This crate has no knowledge of any particular broker or database. It defines:
//!
//! - [`ids`]: typed identifiers (`EventId`, `CorrelationId`, `OrderId`).
//! - [`envelope`]: the wire envelope and typed payloads shared by every service.
//! - [`schema`]: the `(type, version) -> validator` registry used at both produce
//!   and consume sites.
//! - [`event_store`]: the `EventStore` trait (idempotent append, filtered replay query).
//! - [`message_bus`]: the `MessageBus` trait (broker-agnostic publish) and the
//!   `EventHandler`/`Decision` contract the consumer runtime drives handlers through.
//! - [`idempotency`]: the `IdempotencyStore` trait backing HTTP create idempotency.
//! - [`orders`]: the order aggregate read-model and its `OrderRepository` trait.
//!
//! Concrete implementations (Postgres, RabbitMQ/lapin, in-memory test doubles) live
//! in sibling crates and depend on this one.

pub mod envelope;
pub mod event_store;
pub mod idempotency;
pub mod ids;
pub mod message_bus;
pub mod orders;
pub mod schema;

pub use envelope::{Envelope, EnvelopeRaw, Payload};
pub use event_store::{EventFilter, EventStore, EventStoreError};
pub use idempotency::{IdempotencyError, IdempotencyStore};
pub use ids::{CorrelationId, EventId, OrderId};
pub use message_bus::{Decision, EventHandler, MessageBus, MessageBusError, MessageHeaders};
pub use orders::{Order, OrderRepository, OrderRepositoryError, OrderStatus};
pub use schema::{SchemaError, SchemaRegistry};

//! In-memory test doubles for orderflow.
//!
//! Each module here implements one of `orderflow-core`'s storage/broker
//! traits against a plain in-process `Mutex`-guarded collection, so service
//! and handler tests can run without a database or a running broker.
//!
//! - [`event_store`]: [`event_store::InMemoryEventStore`] implements `EventStore`.
//! - [`orders`]: [`orders::InMemoryOrderRepository`] implements `OrderRepository`.
//! - [`idempotency`]: [`idempotency::InMemoryIdempotencyStore`] implements `IdempotencyStore`.
//! - [`message_bus`]: [`message_bus::InMemoryMessageBus`] implements `MessageBus` and
//!   records every publish; [`message_bus::deliver`]/[`message_bus::deliver_until_resolved`]
//!   replay the broker-free ack/retry/dlq decision algorithm that
//!   `orderflow-amqp::consumer` drives real deliveries through.
//!
//! # Example
//!
//! ```
//! use orderflow_testing::event_store::InMemoryEventStore;
//! use orderflow_core::{Envelope, EventStore, CorrelationId};
//! use orderflow_core::envelope::{OrdersCancelledPayload, Payload};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = InMemoryEventStore::new();
//! let envelope = Envelope::new(
//!     "orders.cancelled",
//!     1,
//!     "order-service",
//!     CorrelationId::new(),
//!     Payload::OrdersCancelled(OrdersCancelledPayload {
//!         order_id: "ord_1".to_string().into(),
//!         reason: "customer request".to_string(),
//!     }),
//! );
//! store.append(&envelope).await.unwrap();
//! assert_eq!(store.all().len(), 1);
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod event_store;
pub mod idempotency;
pub mod message_bus;
pub mod orders;

pub use event_store::InMemoryEventStore;
pub use idempotency::InMemoryIdempotencyStore;
pub use message_bus::{deliver, deliver_until_resolved, DeliveryOutcome, InMemoryMessageBus};
pub use orders::InMemoryOrderRepository;

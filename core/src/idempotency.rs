//! HTTP-level idempotency: mapping an `Idempotency-Key` to the `orderId` it
//! originally created (spec §4.4.1, §9). Separate from the event store's
//! eventId-level idempotency, which guards against re-processing a message
//! already seen on the broker rather than a client retrying the same request.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ids::OrderId;

/// Errors from the idempotency store.
#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("database error: {0}")]
    Database(String),
}

/// Maps a client-supplied idempotency key to the order it first created.
///
/// Implementations (in-process for tests, Postgres-backed in production) must
/// enforce `put` is itself idempotent: a second `put` for a key already
/// present is a no-op, never an overwrite (first write wins, spec §4.4.1).
///
/// Dyn-compatible via `Pin<Box<dyn Future>>`, matching this crate's other
/// storage traits.
pub trait IdempotencyStore: Send + Sync {
    /// Look up the order previously created for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`IdempotencyError`] on a backing-store failure.
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<OrderId>, IdempotencyError>> + Send + 'a>>;

    /// Record that `key` created `order_id`, valid until `expires_at`.
    ///
    /// A no-op if `key` is already recorded (spec §4.4.1: first write wins).
    ///
    /// # Errors
    ///
    /// Returns [`IdempotencyError`] on a backing-store failure.
    fn put<'a>(
        &'a self,
        key: &'a str,
        order_id: &'a OrderId,
        expires_at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<(), IdempotencyError>> + Send + 'a>>;
}

//! `PostgreSQL`-backed [`EventStore`]: idempotent append keyed on `event_id`,
//! filtered/ordered scans for replay (spec §4.3).
//!
//! ```sql
//! CREATE TABLE events (
//!     event_id      UUID PRIMARY KEY,
//!     event_type    TEXT NOT NULL,
//!     version       INTEGER NOT NULL,
//!     occurred_at   TIMESTAMPTZ NOT NULL,
//!     producer      TEXT NOT NULL,
//!     correlation_id TEXT NOT NULL,
//!     order_id      TEXT,
//!     payload       JSONB NOT NULL
//! );
//! CREATE INDEX events_order_id_idx ON events (order_id);
//! CREATE INDEX events_occurred_at_idx ON events (occurred_at, event_id);
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use orderflow_core::envelope::EnvelopeRaw;
use orderflow_core::{Envelope, EventFilter, EventId, EventStore, EventStoreError, SchemaRegistry};
use orderflow_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use orderflow_runtime::metrics::EventStoreMetrics;
use sqlx::{PgPool, Row};

/// Event store backed by a `events` table with a unique `event_id` primary key.
pub struct PgEventStore {
    pool: PgPool,
    registry: SchemaRegistry,
    breaker: CircuitBreaker,
}

impl PgEventStore {
    /// Wrap `pool`. Incoming rows are re-parsed through `SchemaRegistry` on read,
    /// since the store persists payloads as JSON, not as a typed `Payload`.
    /// `append` is wrapped in `breaker` (spec §4.3); reads are not.
    #[must_use]
    pub fn new(pool: PgPool, breaker: CircuitBreaker) -> Self {
        Self {
            pool,
            registry: SchemaRegistry,
            breaker,
        }
    }

    fn row_to_envelope(&self, row: &sqlx::postgres::PgRow) -> Result<Envelope, EventStoreError> {
        let raw = EnvelopeRaw {
            event_id: row
                .try_get::<uuid::Uuid, _>("event_id")
                .map_err(|e| EventStoreError::Database(e.to_string()))?
                .into(),
            event_type: row
                .try_get("event_type")
                .map_err(|e| EventStoreError::Database(e.to_string()))?,
            version: {
                let v: i32 = row
                    .try_get("version")
                    .map_err(|e| EventStoreError::Database(e.to_string()))?;
                u32::try_from(v).unwrap_or_default()
            },
            occurred_at: row
                .try_get("occurred_at")
                .map_err(|e| EventStoreError::Database(e.to_string()))?,
            producer: row
                .try_get("producer")
                .map_err(|e| EventStoreError::Database(e.to_string()))?,
            correlation_id: {
                let s: String = row
                    .try_get("correlation_id")
                    .map_err(|e| EventStoreError::Database(e.to_string()))?;
                s.into()
            },
            payload: row
                .try_get("payload")
                .map_err(|e| EventStoreError::Database(e.to_string()))?,
        };
        self.registry
            .validate_incoming(&raw)
            .map_err(|e| EventStoreError::Serialization(e.to_string()))
    }
}

impl EventStore for PgEventStore {
    fn append<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + 'a>> {
        Box::pin(async move {
            let raw = envelope.to_raw();
            let started = Instant::now();
            let result = self
                .breaker
                .call(|| async {
                    sqlx::query(
                        r"
                        INSERT INTO events (
                            event_id, event_type, version, occurred_at, producer, correlation_id, order_id, payload
                        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                        ON CONFLICT (event_id) DO NOTHING
                        ",
                    )
                    .bind(raw.event_id.as_uuid())
                    .bind(&raw.event_type)
                    .bind(i32::try_from(raw.version).unwrap_or(i32::MAX))
                    .bind(raw.occurred_at)
                    .bind(&raw.producer)
                    .bind(raw.correlation_id.as_str())
                    .bind(envelope.order_id())
                    .bind(&raw.payload)
                    .execute(&self.pool)
                    .await
                })
                .await
                .map_err(|e| match e {
                    CircuitBreakerError::Open => {
                        EventStoreError::Database("circuit breaker open".to_string())
                    },
                    CircuitBreakerError::Inner(err) => EventStoreError::Database(err.to_string()),
                })?;

            if result.rows_affected() == 0 {
                tracing::debug!(event_id = %raw.event_id, "append was a no-op, event already stored");
                EventStoreMetrics::record_duplicate_append();
            } else {
                EventStoreMetrics::record_append(started.elapsed());
            }
            Ok(())
        })
    }

    fn find_by_event_id<'a>(
        &'a self,
        event_id: EventId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Envelope>, EventStoreError>> + Send + 'a>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT event_id, event_type, version, occurred_at, producer, correlation_id, payload
                FROM events
                WHERE event_id = $1
                ",
            )
            .bind(event_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EventStoreError::Database(e.to_string()))?;

            row.as_ref().map(|r| self.row_to_envelope(r)).transpose()
        })
    }

    fn find<'a>(
        &'a self,
        filter: &'a EventFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Envelope>, EventStoreError>> + Send + 'a>> {
        Box::pin(async move {
            let started = Instant::now();
            let rows = sqlx::query(
                r"
                SELECT event_id, event_type, version, occurred_at, producer, correlation_id, payload
                FROM events
                WHERE ($1::TEXT IS NULL OR event_type = $1)
                  AND ($2::TEXT IS NULL OR order_id = $2)
                  AND ($3::TIMESTAMPTZ IS NULL OR occurred_at >= $3)
                  AND ($4::TIMESTAMPTZ IS NULL OR occurred_at <= $4)
                ORDER BY occurred_at ASC, event_id ASC
                ",
            )
            .bind(&filter.event_type)
            .bind(&filter.order_id)
            .bind(filter.from)
            .bind(filter.to)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EventStoreError::Database(e.to_string()))?;

            let envelopes = rows
                .iter()
                .map(|row| self.row_to_envelope(row))
                .collect::<Result<Vec<_>, _>>()?;
            EventStoreMetrics::record_query(envelopes.len(), started.elapsed());
            Ok(envelopes)
        })
    }
}

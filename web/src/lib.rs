//! Axum HTTP surface shared by orderflow services.
//!
//! Only the order service exposes an HTTP listener (spec §5 scheduling
//! model); this crate provides the pieces every HTTP-facing service would
//! need — request errors, correlation/idempotency extractors, the
//! correlation id middleware, and health/readiness handlers — so the order
//! service assembles its router from the same building blocks the rest of
//! the workspace uses for ambient concerns.
//!
//! # Example
//!
//! ```ignore
//! use orderflow_web::{AppError, middleware::correlation_id_layer};
//! use axum::{Router, routing::post, Json};
//!
//! async fn create_order(
//!     correlation_id: orderflow_web::extractors::CorrelationId,
//!     Json(request): Json<CreateOrderRequest>,
//! ) -> Result<Json<CreateOrderResponse>, AppError> {
//!     // validate, persist, publish...
//!     Ok(Json(response))
//! }
//!
//! let app = Router::new()
//!     .route("/orders", post(create_order))
//!     .layer(correlation_id_layer());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{ClientIp, CorrelationId, IdempotencyKey, UserAgent};
pub use handlers::{health_check, ready_check, DependencyProbe, Readiness};
pub use middleware::{correlation_id_layer, CorrelationIdExt, CORRELATION_ID_HEADER};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

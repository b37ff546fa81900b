//! Axum middleware for request tracking and observability.
//!
//! This module provides middleware layers for:
//! - **Correlation id tracking**: extract or generate correlation ids for distributed tracing
//! - **Response headers**: automatically inject the correlation id into responses
//! - **Tracing integration**: create spans with correlation context
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use orderflow_web::middleware::correlation_id_layer;
//!
//! let app = Router::new()
//!     .route("/orders", post(create_order))
//!     .layer(correlation_id_layer());
//! ```
//!
//! # Flow
//!
//! 1. **Extract** correlation id from the `x-correlation-id` header (or mint a new one)
//! 2. **Store** in request extensions for handler access
//! 3. **Create a tracing span** with the correlation_id field
//! 4. **Inject** the correlation id into the response `x-correlation-id` header

use axum::{extract::Request, http::HeaderValue, response::Response};
use orderflow_core::CorrelationId;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Header name carrying the correlation id (spec §6).
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Create a layer that adds correlation id tracking to all requests.
///
/// This layer:
/// - Extracts the correlation id from the request header, or mints a new one
/// - Stores the correlation id in request extensions
/// - Creates a tracing span with the correlation_id field
/// - Injects the correlation id into the response header
///
/// # Example
///
/// ```ignore
/// use axum::Router;
/// use orderflow_web::middleware::correlation_id_layer;
///
/// let app = Router::new()
///     .route("/orders", post(create_order))
///     .layer(correlation_id_layer());
/// ```
#[must_use]
pub fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// Layer for correlation id tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdMiddleware { inner }
    }
}

/// Middleware service for correlation id tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request> for CorrelationIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let correlation_id: CorrelationId = req
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| CorrelationId::from(s.to_string()))
            .unwrap_or_default();

        req.extensions_mut().insert(correlation_id.clone());

        let span = tracing::info_span!(
            "http_request",
            correlation_id = %correlation_id,
            method = %req.method(),
            uri = %req.uri(),
        );

        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.instrument(span).await?;

            if let Ok(header_value) = HeaderValue::from_str(correlation_id.as_str()) {
                response
                    .headers_mut()
                    .insert(CORRELATION_ID_HEADER, header_value);
            }

            Ok(response)
        })
    }
}

/// Extension trait for extracting the correlation id from request extensions.
///
/// # Example
///
/// ```ignore
/// use orderflow_web::middleware::CorrelationIdExt;
///
/// async fn handler(req: Request) -> String {
///     let correlation_id = req.correlation_id();
///     format!("Request ID: {correlation_id}")
/// }
/// ```
pub trait CorrelationIdExt {
    /// Get the correlation id from request extensions.
    ///
    /// # Panics
    ///
    /// Panics if the correlation id middleware is not installed.
    /// Always use `correlation_id_layer()` in your router.
    fn correlation_id(&self) -> CorrelationId;

    /// Try to get the correlation id from request extensions.
    ///
    /// Returns `None` if the correlation id middleware is not installed.
    fn try_correlation_id(&self) -> Option<CorrelationId>;
}

impl CorrelationIdExt for Request {
    fn correlation_id(&self) -> CorrelationId {
        self.extensions()
            .get::<CorrelationId>()
            .cloned()
            .expect("CorrelationId middleware not installed")
    }

    fn try_correlation_id(&self) -> Option<CorrelationId> {
        self.extensions().get::<CorrelationId>().cloned()
    }
}

// Re-export tracing for use with Instrument
use tracing::Instrument;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, response::IntoResponse, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_correlation_id_generated_if_missing() {
        let app = Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(correlation_id_layer());

        let request = Request::builder()
            .uri("/test")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        let correlation_id = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .expect("Correlation ID header should be present");

        assert!(!correlation_id.to_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_correlation_id_preserved_from_request() {
        let app = Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(correlation_id_layer());

        let request = Request::builder()
            .uri("/test")
            .header(CORRELATION_ID_HEADER, "corr-xyz")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        let response_id = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .expect("Correlation ID header should be present")
            .to_str()
            .unwrap();

        assert_eq!(response_id, "corr-xyz");
    }

    #[tokio::test]
    async fn test_correlation_id_in_extensions() {
        use axum::body::Body;

        async fn handler(req: Request<Body>) -> impl IntoResponse {
            let correlation_id = req.correlation_id();
            format!("Correlation ID: {correlation_id}")
        }

        let app = Router::new()
            .route("/test", get(handler))
            .layer(correlation_id_layer());

        let request = Request::builder()
            .uri("/test")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_empty_header_generates_new() {
        let app = Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(correlation_id_layer());

        let request = Request::builder()
            .uri("/test")
            .header(CORRELATION_ID_HEADER, "")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        let correlation_id = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .expect("Correlation ID header should be present");

        assert!(!correlation_id.to_str().unwrap().is_empty());
    }
}

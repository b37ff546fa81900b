//! Application state for Axum handlers.
//!
//! This module provides a generic `AppState` that can be customized per application.
//! Domain-specific stores should be added by the application using this crate.

/// Application state shared across all HTTP handlers.
///
/// This is a placeholder type. Applications should define their own state struct
/// containing their domain-specific store and broker handles.
///
/// # Examples
///
/// ```ignore
/// use axum::{extract::State, Json};
/// use orderflow_core::{EventStore, MessageBus, OrderRepository, IdempotencyStore};
/// use orderflow_web::AppError;
/// use std::sync::Arc;
///
/// // Define your app-specific state (the order service, which is the only
/// // service with an HTTP surface, does this with its own `OrderServiceState`).
/// struct MyAppState {
///     orders: Arc<dyn OrderRepository>,
///     events: Arc<dyn EventStore>,
///     bus: Arc<dyn MessageBus>,
///     idempotency: Arc<dyn IdempotencyStore>,
/// }
///
/// async fn handler(
///     State(state): State<Arc<MyAppState>>,
/// ) -> Result<Json<Response>, AppError> {
///     // Use your stores
///     Ok(Json(response))
/// }
/// ```
#[derive(Clone)]
pub struct AppState {
    // Placeholder - applications should define their own state
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        // Ensure AppState implements Clone (required for Axum)
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_state_default() {
        let _ = AppState::default();
    }
}

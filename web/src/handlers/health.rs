//! Health and readiness endpoints (spec §4.6).
//!
//! Liveness (`GET /health`) never depends on anything external: a process
//! that can run this handler at all is, by definition, alive. Readiness
//! (`GET /ready`) additionally runs a set of [`DependencyProbe`]s — a
//! database ping and a named-queue inspection, per the spec — each bounded by
//! a shared timeout, so a wedged dependency reports not-ready instead of
//! hanging the probe.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, Json};
use futures::future::join_all;
use serde::Serialize;

/// A single external dependency a readiness check verifies.
///
/// Dyn-compatible via `Pin<Box<dyn Future>>`, matching this workspace's other
/// async traits, so a service can hold a heterogeneous `Vec<Arc<dyn DependencyProbe>>`
/// (one for the database, one per broker queue it cares about).
pub trait DependencyProbe: Send + Sync {
    /// Human-readable name, used only for logging on failure.
    fn name(&self) -> &str;

    /// Returns `true` if the dependency is reachable right now.
    fn check<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

/// The set of dependencies `/ready` verifies, plus the per-check timeout.
pub struct Readiness {
    probes: Vec<Arc<dyn DependencyProbe>>,
    timeout: Duration,
}

impl Readiness {
    /// Build a readiness check from `probes`, each bounded by `timeout`
    /// (spec §4.6: "a configurable timeout, ~1.5s").
    #[must_use]
    pub fn new(probes: Vec<Arc<dyn DependencyProbe>>, timeout: Duration) -> Self {
        Self { probes, timeout }
    }

    /// Run every probe concurrently; ready only if all respond `true` within
    /// `timeout`. A probe that times out counts as failed, never as an error
    /// that propagates (spec §9: "exceeding it counts as not-ready").
    pub async fn check(&self) -> bool {
        let checks = self.probes.iter().map(|probe| async move {
            match tokio::time::timeout(self.timeout, probe.check()).await {
                Ok(true) => true,
                Ok(false) => {
                    tracing::warn!(dependency = probe.name(), "readiness probe reported unhealthy");
                    false
                },
                Err(_) => {
                    tracing::warn!(dependency = probe.name(), "readiness probe timed out");
                    false
                },
            }
        });
        join_all(checks).await.into_iter().all(|ok| ok)
    }
}

#[derive(Debug, Serialize)]
struct StatusBody {
    status: &'static str,
}

/// `GET /health`: liveness only, never checks a dependency (spec §4.6, §10.5).
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, Json<StatusBody>) {
    (StatusCode::OK, Json(StatusBody { status: "ok" }))
}

/// `GET /ready`: 200 `{status:"ready"}` if every dependency probe passes within
/// its timeout, otherwise 503 `{status:"not_ready"}` (spec §4.6, §10.5).
pub async fn ready_check(readiness: Arc<Readiness>) -> (StatusCode, Json<StatusBody>) {
    if readiness.check().await {
        (StatusCode::OK, Json(StatusBody { status: "ready" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(StatusBody { status: "not_ready" }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakyProbe {
        name: String,
        healthy: AtomicBool,
    }

    impl DependencyProbe for FlakyProbe {
        fn name(&self) -> &str {
            &self.name
        }

        fn check<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
            Box::pin(async move { self.healthy.load(Ordering::SeqCst) })
        }
    }

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, Json(body)) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn test_ready_when_all_probes_pass() {
        let readiness = Arc::new(Readiness::new(
            vec![Arc::new(FlakyProbe {
                name: "database".to_string(),
                healthy: AtomicBool::new(true),
            })],
            Duration::from_millis(100),
        ));

        let (status, Json(body)) = ready_check(readiness).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ready");
    }

    #[tokio::test]
    async fn test_not_ready_when_a_probe_fails() {
        let readiness = Arc::new(Readiness::new(
            vec![
                Arc::new(FlakyProbe {
                    name: "database".to_string(),
                    healthy: AtomicBool::new(true),
                }),
                Arc::new(FlakyProbe {
                    name: "broker".to_string(),
                    healthy: AtomicBool::new(false),
                }),
            ],
            Duration::from_millis(100),
        ));

        let (status, Json(body)) = ready_check(readiness).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "not_ready");
    }
}

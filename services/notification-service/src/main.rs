//! Notification service: headless consumer of the four queues that trigger a
//! `notification.sent` event (spec §4.4.3, §5 "HTTP listener (Order service only)").
//!
//! Exposes no business HTTP API, only the ambient `/health`, `/ready`,
//! `/metrics` surface every service in this system carries regardless of
//! that non-goal.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use orderflow_amqp::{declare_topology, run_consumer, ConsumerConfig};
use orderflow_core::envelope::NotificationKind;
use orderflow_core::{EventStore, MessageBus, SchemaRegistry};
use orderflow_postgres::PgEventStore;
use orderflow_runtime::metrics::MetricsServer;
use orderflow_runtime::{retry_with_backoff, CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
use orderflow_web::handlers::{health_check, ready_check, DependencyProbe, Readiness};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use notification_service::consumers::NotificationHandler;
use notification_service::Config;

struct DatabaseProbe {
    pool: sqlx::PgPool,
}

impl DependencyProbe for DatabaseProbe {
    fn name(&self) -> &str {
        "database"
    }

    fn check<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move { sqlx::query("SELECT 1").execute(&self.pool).await.is_ok() })
    }
}

struct BrokerProbe {
    channel: lapin::Channel,
}

impl DependencyProbe for BrokerProbe {
    fn name(&self) -> &str {
        "broker"
    }

    fn check<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move { self.channel.status().connected() })
    }
}

/// One bound queue and the notification kind it maps to (spec §4.4.3).
struct QueueKind {
    queue: &'static str,
    routing_key: &'static str,
    retry_exchange: &'static str,
    kind: NotificationKind,
}

const QUEUE_KINDS: &[QueueKind] = &[
    QueueKind {
        queue: "orders.created.notification.q",
        routing_key: "orders.created.v1",
        retry_exchange: "orders.retry",
        kind: NotificationKind::OrderCreated,
    },
    QueueKind {
        queue: "orders.cancelled.notification.q",
        routing_key: "orders.cancelled.v1",
        retry_exchange: "orders.retry",
        kind: NotificationKind::OrderCancelled,
    },
    QueueKind {
        queue: "inventory.reserve.approved.notification.q",
        routing_key: "inventory.reserve.approved.v1",
        retry_exchange: "inventory.retry",
        kind: NotificationKind::OrderConfirmed,
    },
    QueueKind {
        queue: "inventory.reserve.rejected.notification.q",
        routing_key: "inventory.reserve.rejected.v1",
        retry_exchange: "inventory.retry",
        kind: NotificationKind::OrderRejected,
    },
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = Config::from_env();
    info!(service = %config.service_name, "starting notification service");

    let reconnect_policy = RetryPolicy::builder().max_delay(Duration::from_secs(30)).build();

    let pg_pool = connect_database(&config.database_url, reconnect_policy.clone()).await?;

    let amqp_pool = orderflow_amqp::build_pool(&config.amqp_url)?;
    let publish_channel = connect_channel(&amqp_pool, reconnect_policy.clone()).await?;
    declare_topology(&publish_channel).await?;

    let mut metrics_server = MetricsServer::new(SocketAddr::from(([0, 0, 0, 0], config.metrics_port)));
    metrics_server.start()?;
    let metrics_server = Arc::new(metrics_server);

    let breaker_config = CircuitBreakerConfig::builder()
        .failure_threshold(if config.circuit_breaker_enabled {
            config.circuit_breaker_failure_threshold
        } else {
            usize::MAX
        })
        .timeout(config.circuit_breaker_reset_timeout)
        .build();
    let mq_breaker = CircuitBreaker::new(breaker_config.clone());
    let bus: Arc<dyn MessageBus> =
        Arc::new(orderflow_amqp::AmqpMessageBus::new(publish_channel, mq_breaker));

    let events: Arc<dyn EventStore> =
        Arc::new(PgEventStore::new(pg_pool.clone(), CircuitBreaker::new(breaker_config.clone())));

    let readiness_channel = connect_channel(&amqp_pool, reconnect_policy.clone()).await?;
    let readiness = Arc::new(Readiness::new(
        vec![
            Arc::new(DatabaseProbe {
                pool: pg_pool.clone(),
            }),
            Arc::new(BrokerProbe {
                channel: readiness_channel,
            }),
        ],
        std::time::Duration::from_millis(1500),
    ));

    let consumer_handles =
        spawn_consumers(&amqp_pool, events, bus, &config, reconnect_policy).await?;

    let app = Router::new()
        .route("/health", get(health_check))
        .route(
            "/ready",
            get({
                let readiness = readiness.clone();
                move || ready_check(readiness.clone())
            }),
        )
        .route(
            "/metrics",
            get(move || {
                let metrics_server = metrics_server.clone();
                async move { metrics_server.render().unwrap_or_default() }
            }),
        );

    let listener =
        tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], config.metrics_port))).await?;
    info!(port = config.metrics_port, "ops HTTP surface listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for handle in consumer_handles {
        handle.abort();
    }

    info!("notification service stopped");
    Ok(())
}

/// Connects to Postgres, retrying with exponential backoff (spec §4.5) so a
/// database that is still starting up does not fail the service outright.
async fn connect_database(
    database_url: &str,
    policy: RetryPolicy,
) -> Result<sqlx::PgPool, Box<dyn std::error::Error>> {
    let pool = retry_with_backoff(policy, || {
        PgPoolOptions::new().max_connections(10).connect(database_url)
    })
    .await?;
    Ok(pool)
}

/// Opens a broker channel, retrying with exponential backoff (spec §4.5) so a
/// broker that is still starting up does not fail the service outright.
async fn connect_channel(
    amqp_pool: &deadpool_lapin::Pool,
    policy: RetryPolicy,
) -> Result<lapin::Channel, Box<dyn std::error::Error>> {
    let channel = retry_with_backoff(policy, || orderflow_amqp::open_channel(amqp_pool)).await?;
    Ok(channel)
}

async fn spawn_consumers(
    amqp_pool: &deadpool_lapin::Pool,
    events: Arc<dyn EventStore>,
    bus: Arc<dyn MessageBus>,
    config: &Config,
    reconnect_policy: RetryPolicy,
) -> Result<Vec<tokio::task::JoinHandle<()>>, Box<dyn std::error::Error>> {
    let registry = SchemaRegistry;
    let mut handles = Vec::with_capacity(QUEUE_KINDS.len());

    for queue_kind in QUEUE_KINDS {
        let channel = connect_channel(amqp_pool, reconnect_policy.clone()).await?;
        let handler = Arc::new(NotificationHandler {
            events: events.clone(),
            bus: bus.clone(),
            registry,
            producer: config.service_name.clone(),
            kind: queue_kind.kind,
        });
        let consumer_config = ConsumerConfig {
            prefetch: config.prefetch,
            max_attempts: config.max_attempts,
            routing_key: queue_kind.routing_key.to_string(),
            retry_exchange: queue_kind.retry_exchange.to_string(),
        };
        let queue = queue_kind.queue;

        handles.push(tokio::spawn(async move {
            if let Err(err) = run_consumer(channel, queue, registry, handler, consumer_config).await {
                error!(queue, error = %err, "consumer exited");
            }
        }));
    }

    Ok(handles)
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}

//! Inventory service: headless consumer of `order.created.q` and
//! `orders.cancelled.q` (spec §4.4.2, §5 "HTTP listener (Order service only)").
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
use orderflow_core::SchemaRegistry;
use orderflow_postgres::PgEventStore;
use orderflow_runtime::metrics::MetricsServer;
use orderflow_runtime::{retry_with_backoff, CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
use orderflow_web::handlers::{health_check, ready_check, DependencyProbe, Readiness};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use inventory_service::consumers::{OrderCancelledHandler, OrderCreatedHandler};
use inventory_service::Config;

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

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = Config::from_env();
    info!(service = %config.service_name, "starting inventory service");

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
    let bus = Arc::new(orderflow_amqp::AmqpMessageBus::new(publish_channel, mq_breaker));

    let events = Arc::new(PgEventStore::new(pg_pool.clone(), CircuitBreaker::new(breaker_config.clone())));

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

    info!("inventory service stopped");
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
    events: Arc<dyn orderflow_core::EventStore>,
    bus: Arc<dyn orderflow_core::MessageBus>,
    config: &Config,
    reconnect_policy: RetryPolicy,
) -> Result<Vec<tokio::task::JoinHandle<()>>, Box<dyn std::error::Error>> {
    let created_channel = connect_channel(amqp_pool, reconnect_policy.clone()).await?;
    let cancelled_channel = connect_channel(amqp_pool, reconnect_policy).await?;

    let created_handler = Arc::new(OrderCreatedHandler::new(
        events.clone(),
        bus,
        config.service_name.clone(),
    ));
    let cancelled_handler = Arc::new(OrderCancelledHandler { events });

    let created_config = ConsumerConfig {
        prefetch: config.prefetch,
        max_attempts: config.max_attempts,
        routing_key: "orders.created.v1".to_string(),
        retry_exchange: "orders.retry".to_string(),
    };
    let cancelled_config = ConsumerConfig {
        routing_key: "orders.cancelled.v1".to_string(),
        ..created_config.clone()
    };

    let registry = SchemaRegistry;
    let created_task = tokio::spawn(async move {
        if let Err(err) = run_consumer(
            created_channel,
            "order.created.q",
            registry,
            created_handler,
            created_config,
        )
        .await
        {
            error!(error = %err, "order.created consumer exited");
        }
    });
    let cancelled_task = tokio::spawn(async move {
        if let Err(err) = run_consumer(
            cancelled_channel,
            "orders.cancelled.q",
            registry,
            cancelled_handler,
            cancelled_config,
        )
        .await
        {
            error!(error = %err, "orders.cancelled consumer exited");
        }
    });

    Ok(vec![created_task, cancelled_task])
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

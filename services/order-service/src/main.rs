//! Order service: the only HTTP-facing service in this system (spec §5). It
//! accepts order creation/cancellation over HTTP, and separately consumes the
//! two inventory-reservation events that drive the order state machine.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use orderflow_amqp::{declare_topology, run_consumer, ConsumerConfig};
use orderflow_core::SchemaRegistry;
use orderflow_postgres::{PgEventStore, PgIdempotencyStore, PgOrderRepository};
use orderflow_runtime::metrics::MetricsServer;
use orderflow_runtime::{retry_with_backoff, CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
use orderflow_web::handlers::{health_check, ready_check, DependencyProbe, Readiness};
use orderflow_web::middleware::correlation_id_layer;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use order_service::consumers::{ReserveApprovedHandler, ReserveRejectedHandler};
use order_service::handlers::{cancel_order, create_order, dlq_depth};
use order_service::state::OrderServiceState;
use order_service::Config;

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
    info!(service = %config.service_name, port = config.port, "starting order service");

    let reconnect_policy = RetryPolicy::builder().max_delay(Duration::from_secs(30)).build();

    let pg_pool = connect_database(&config.database_url, reconnect_policy.clone()).await?;

    let amqp_pool = orderflow_amqp::build_pool(&config.amqp_url)?;
    let publish_channel = connect_channel(&amqp_pool, reconnect_policy.clone()).await?;
    declare_topology(&publish_channel).await?;

    let mut metrics_server = MetricsServer::new(SocketAddr::from(([0, 0, 0, 0], 9090)));
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

    let orders = Arc::new(PgOrderRepository::new(pg_pool.clone()));
    let events = Arc::new(PgEventStore::new(pg_pool.clone(), CircuitBreaker::new(breaker_config.clone())));
    let idempotency = Arc::new(PgIdempotencyStore::new(pg_pool.clone()));

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
        config.readiness_timeout,
    ));

    let dlq_channel = connect_channel(&amqp_pool, reconnect_policy.clone()).await?;

    let state = OrderServiceState {
        orders: orders.clone(),
        events: events.clone(),
        bus,
        idempotency,
        registry: SchemaRegistry,
        producer: config.service_name.clone(),
        idempotency_ttl: config.idempotency_ttl,
        readiness,
        dlq_channel,
    };

    let consumer_handles =
        spawn_consumers(&amqp_pool, orders, events, &config, reconnect_policy).await?;

    let app = Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:order_id/cancel", post(cancel_order))
        .route("/internal/dlq-depth", get(dlq_depth))
        .route("/health", get(health_check))
        .route(
            "/ready",
            get({
                let readiness = state.readiness.clone();
                move || ready_check(readiness.clone())
            }),
        )
        .route(
            "/metrics",
            get(move || {
                let metrics_server = metrics_server.clone();
                async move { metrics_server.render().unwrap_or_default() }
            }),
        )
        .layer(correlation_id_layer())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], config.port))).await?;
    info!(port = config.port, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for handle in consumer_handles {
        handle.abort();
    }

    info!("order service stopped");
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
    orders: Arc<dyn orderflow_core::OrderRepository>,
    events: Arc<dyn orderflow_core::EventStore>,
    config: &Config,
    reconnect_policy: RetryPolicy,
) -> Result<Vec<tokio::task::JoinHandle<()>>, Box<dyn std::error::Error>> {
    let approved_channel = connect_channel(amqp_pool, reconnect_policy.clone()).await?;
    let rejected_channel = connect_channel(amqp_pool, reconnect_policy).await?;

    let approved_handler = Arc::new(ReserveApprovedHandler {
        orders: orders.clone(),
        events: events.clone(),
    });
    let rejected_handler = Arc::new(ReserveRejectedHandler { orders, events });

    let consumer_config = ConsumerConfig {
        prefetch: config.prefetch,
        max_attempts: config.max_attempts,
        routing_key: "inventory.reserve.approved.v1".to_string(),
        retry_exchange: "inventory.retry".to_string(),
    };
    let rejected_consumer_config = ConsumerConfig {
        routing_key: "inventory.reserve.rejected.v1".to_string(),
        ..consumer_config.clone()
    };

    let registry = SchemaRegistry;
    let approved_task = tokio::spawn(async move {
        if let Err(err) = run_consumer(
            approved_channel,
            "inventory.reserve.approved.q",
            registry,
            approved_handler,
            consumer_config,
        )
        .await
        {
            error!(error = %err, "inventory.reserve.approved consumer exited");
        }
    });
    let rejected_task = tokio::spawn(async move {
        if let Err(err) = run_consumer(
            rejected_channel,
            "inventory.reserve.rejected.q",
            registry,
            rejected_handler,
            rejected_consumer_config,
        )
        .await
        {
            error!(error = %err, "inventory.reserve.rejected consumer exited");
        }
    });

    Ok(vec![approved_task, rejected_task])
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

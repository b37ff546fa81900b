//! Entry point for the `replay` CLI (spec §4.5, §6).

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use orderflow_core::EventFilter;
use orderflow_postgres::PgEventStore;
use orderflow_replay::{replay, Cli};
use orderflow_runtime::{retry_with_backoff, RetryPolicy};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_target(false).init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(summary) if summary.had_publish_errors() => {
            error!(?summary, "replay completed with publish errors");
            ExitCode::FAILURE
        },
        Ok(summary) => {
            info!(
                published = summary.published,
                skipped_unknown_type = summary.skipped_unknown_type,
                "replay complete"
            );
            ExitCode::SUCCESS
        },
        Err(err) => {
            error!(error = %err, "replay failed");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<orderflow_replay::ReplaySummary, Box<dyn std::error::Error>> {
    let reconnect_policy = RetryPolicy::builder().max_delay(Duration::from_secs(30)).build();

    let pg_pool = retry_with_backoff(reconnect_policy.clone(), || {
        PgPoolOptions::new().max_connections(5).connect(&cli.database_url)
    })
    .await?;
    let breaker_config = orderflow_runtime::CircuitBreakerConfig::builder().build();
    let events = PgEventStore::new(pg_pool, orderflow_runtime::CircuitBreaker::new(breaker_config.clone()));

    let amqp_pool = orderflow_amqp::build_pool(&cli.amqp_url)?;
    let channel = retry_with_backoff(reconnect_policy, || orderflow_amqp::open_channel(&amqp_pool)).await?;
    orderflow_amqp::declare_topology(&channel).await?;
    let bus = orderflow_amqp::AmqpMessageBus::new(
        channel,
        orderflow_runtime::CircuitBreaker::new(breaker_config),
    );

    let mut filter = EventFilter::all();
    if let Some(event_type) = cli.event_type {
        filter = filter.with_event_type(event_type);
    }
    if let Some(order_id) = cli.order_id {
        filter = filter.with_order_id(order_id);
    }
    if let Some(from) = cli.from {
        filter = filter.with_from(from);
    }
    if let Some(to) = cli.to {
        filter = filter.with_to(to);
    }

    Ok(replay(&events, &bus, &filter).await?)
}

//! Command-line argument parsing (spec §6 "Replay CLI").

use chrono::{DateTime, Utc};
use clap::Parser;

/// `replay [--type=T] [--orderId=ID] [--from=ISO] [--to=ISO]`
#[derive(Debug, Parser)]
#[command(name = "replay", about = "Republish a filtered slice of the event store onto the broker")]
pub struct Cli {
    /// Restrict to a single event type, e.g. `orders.created`.
    #[arg(long = "type")]
    pub event_type: Option<String>,

    /// Restrict to a single order id.
    #[arg(long = "orderId")]
    pub order_id: Option<String>,

    /// Restrict to `occurredAt >= from`, RFC 3339.
    #[arg(long)]
    pub from: Option<DateTime<Utc>>,

    /// Restrict to `occurredAt <= to`, RFC 3339.
    #[arg(long)]
    pub to: Option<DateTime<Utc>>,

    /// `PostgreSQL` connection string for the event store to read from.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// RabbitMQ connection string to republish onto.
    #[arg(long, env = "AMQP_URL")]
    pub amqp_url: String,
}

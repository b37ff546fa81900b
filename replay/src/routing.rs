//! The static `type -> (exchange, routingKey)` table the replay tool uses to
//! decide where to republish each event (spec §4.5).

use orderflow_amqp::topology::{EXCHANGE_INVENTORY, EXCHANGE_NOTIFICATIONS, EXCHANGE_ORDERS};

/// Look up the exchange and routing key a given event `type` was originally
/// published with. Returns `None` for an event type with no known producer
/// route — the caller skips these with a warning rather than guessing.
#[must_use]
pub fn route_for(event_type: &str) -> Option<(&'static str, &'static str)> {
    match event_type {
        "orders.created" => Some((EXCHANGE_ORDERS, "orders.created.v1")),
        "orders.cancelled" => Some((EXCHANGE_ORDERS, "orders.cancelled.v1")),
        "inventory.reserve.approved" => Some((EXCHANGE_INVENTORY, "inventory.reserve.approved.v1")),
        "inventory.reserve.rejected" => Some((EXCHANGE_INVENTORY, "inventory.reserve.rejected.v1")),
        "notification.sent" => Some((EXCHANGE_NOTIFICATIONS, "notification.sent.v1")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_registered_type_has_a_route() {
        for event_type in [
            "orders.created",
            "orders.cancelled",
            "inventory.reserve.approved",
            "inventory.reserve.rejected",
            "notification.sent",
        ] {
            assert!(route_for(event_type).is_some());
        }
    }

    #[test]
    fn unknown_type_has_no_route() {
        assert_eq!(route_for("something.else"), None);
    }
}

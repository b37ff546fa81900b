//! HTTP handlers for order intake and cancellation (spec §4.4.1).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{Duration as ChronoDuration, Utc};
use orderflow_amqp::topology::EXCHANGE_ORDERS;
use orderflow_core::envelope::{LineItem, OrdersCancelledPayload, OrdersCreatedPayload};
use orderflow_core::{Envelope, MessageHeaders, OrderId, OrderStatus, Payload};
use orderflow_web::extractors::{CorrelationId, IdempotencyKey};
use orderflow_web::AppError;
use serde::{Deserialize, Serialize};

use crate::state::OrderServiceState;

/// One line item on a `POST /orders` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemRequest {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price: f64,
}

/// `POST /orders` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub items: Vec<LineItemRequest>,
}

/// `POST /orders/{orderId}/cancel` request body. A missing or empty `reason`
/// defaults to `"customer request"`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

/// Response body shared by create and cancel.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: String,
    pub status: OrderStatus,
}

fn validate_create_request(request: &CreateOrderRequest) -> Result<(), AppError> {
    if request.customer_id.trim().is_empty() {
        return Err(AppError::bad_request("customerId must not be empty"));
    }
    if request.items.is_empty() {
        return Err(AppError::bad_request(
            "items must contain at least one line item",
        ));
    }
    for item in &request.items {
        if item.product_id.trim().is_empty() {
            return Err(AppError::bad_request("productId must not be empty"));
        }
        if item.quantity == 0 {
            return Err(AppError::bad_request("quantity must be positive"));
        }
        if item.unit_price <= 0.0 {
            return Err(AppError::bad_request("unitPrice must be positive"));
        }
    }
    Ok(())
}

/// `POST /orders`: validate, idempotent-create, append `orders.created`, publish.
///
/// A present `Idempotency-Key` that already maps to an order short-circuits
/// the whole flow and returns the original order unchanged (spec §4.4.1 step
/// 1). A schema failure on the envelope this handler itself builds is a bug,
/// not a client error, so it is reported as 500 and the message is never
/// published (spec §7).
///
/// # Errors
///
/// Returns [`AppError`] for invalid input (400) or a storage/broker failure (500).
pub async fn create_order(
    State(state): State<OrderServiceState>,
    CorrelationId(correlation_id): CorrelationId,
    IdempotencyKey(idempotency_key): IdempotencyKey,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    validate_create_request(&request)?;

    if let Some(key) = &idempotency_key {
        if let Some(existing_order_id) = state
            .idempotency
            .get(key)
            .await
            .map_err(|e| AppError::internal(e.to_string()))?
        {
            let order = state
                .orders
                .find(&existing_order_id)
                .await
                .map_err(|e| AppError::internal(e.to_string()))?
                .ok_or_else(|| {
                    AppError::internal("idempotency key maps to an order that no longer exists")
                })?;
            return Ok((
                StatusCode::OK,
                Json(OrderResponse {
                    order_id: order.order_id.as_str().to_string(),
                    status: order.status,
                }),
            ));
        }
    }

    let order_id = OrderId::new();
    let items: Vec<LineItem> = request
        .items
        .iter()
        .map(|item| LineItem {
            product_id: item.product_id.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
        })
        .collect();
    let total: f64 = items
        .iter()
        .map(|item| f64::from(item.quantity) * item.unit_price)
        .sum();

    let order = state
        .orders
        .create(&order_id, &request.customer_id, &items, total)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    let envelope = Envelope::new(
        "orders.created",
        1,
        state.producer.clone(),
        correlation_id,
        Payload::OrdersCreated(OrdersCreatedPayload {
            order_id: order.order_id.clone(),
            customer_id: order.customer_id.clone(),
            items: order.items.clone(),
            total: order.total,
        }),
    );
    state
        .registry
        .validate_outgoing(&envelope)
        .map_err(|e| AppError::internal(format!("built an invalid orders.created envelope: {e}")))?;

    state
        .events
        .append(&envelope)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    let headers = MessageHeaders::for_envelope(&envelope);
    state
        .bus
        .publish(EXCHANGE_ORDERS, "orders.created.v1", &envelope.to_raw(), &headers)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    if let Some(key) = idempotency_key {
        let ttl = ChronoDuration::from_std(state.idempotency_ttl).unwrap_or(ChronoDuration::days(1));
        state
            .idempotency
            .put(&key, &order.order_id, Utc::now() + ttl)
            .await
            .map_err(|e| AppError::internal(e.to_string()))?;
    }

    Ok((
        StatusCode::CREATED,
        Json(OrderResponse {
            order_id: order.order_id.as_str().to_string(),
            status: order.status,
        }),
    ))
}

/// `POST /orders/{orderId}/cancel`: eagerly transition to `CANCELLED` and
/// publish `orders.cancelled`, regardless of the order's current status
/// (spec §4.4.1). An unknown `orderId` is logged but not fatal.
///
/// # Errors
///
/// Returns [`AppError`] for an empty path segment (400) or a storage/broker
/// failure (500).
pub async fn cancel_order(
    State(state): State<OrderServiceState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(order_id): Path<String>,
    Json(request): Json<CancelOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    if order_id.trim().is_empty() {
        return Err(AppError::bad_request("orderId must not be empty"));
    }
    let order_id = OrderId::from(order_id);
    let reason = request
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "customer request".to_string());

    let updated = state
        .orders
        .update_status(&order_id, OrderStatus::Cancelled)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    if !updated {
        tracing::warn!(order_id = order_id.as_str(), "cancel requested for unknown order id");
    }

    let envelope = Envelope::new(
        "orders.cancelled",
        1,
        state.producer.clone(),
        correlation_id,
        Payload::OrdersCancelled(OrdersCancelledPayload {
            order_id: order_id.clone(),
            reason,
        }),
    );
    state
        .registry
        .validate_outgoing(&envelope)
        .map_err(|e| AppError::internal(format!("built an invalid orders.cancelled envelope: {e}")))?;

    state
        .events
        .append(&envelope)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    let headers = MessageHeaders::for_envelope(&envelope);
    state
        .bus
        .publish(EXCHANGE_ORDERS, "orders.cancelled.v1", &envelope.to_raw(), &headers)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(OrderResponse {
            order_id: order_id.as_str().to_string(),
            status: OrderStatus::Cancelled,
        }),
    ))
}

/// `GET /internal/dlq-depth`: current message count in every dead-letter
/// queue this service owns (spec §10.6).
///
/// # Errors
///
/// Returns [`AppError`] if the broker rejects the passive queue inspection.
pub async fn dlq_depth(
    State(state): State<OrderServiceState>,
) -> Result<Json<std::collections::HashMap<String, u32>>, AppError> {
    let depths = crate::dlq::dlq_depths(&state.dlq_channel)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(depths))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_customer_id() {
        let request = CreateOrderRequest {
            customer_id: "   ".to_string(),
            items: vec![LineItemRequest {
                product_id: "sku_1".to_string(),
                quantity: 1,
                unit_price: 1.0,
            }],
        };
        assert!(validate_create_request(&request).is_err());
    }

    #[test]
    fn rejects_empty_items() {
        let request = CreateOrderRequest {
            customer_id: "cust_1".to_string(),
            items: vec![],
        };
        assert!(validate_create_request(&request).is_err());
    }

    #[test]
    fn rejects_non_positive_quantity_or_price() {
        let base = LineItemRequest {
            product_id: "sku_1".to_string(),
            quantity: 0,
            unit_price: 1.0,
        };
        let request = CreateOrderRequest {
            customer_id: "cust_1".to_string(),
            items: vec![base],
        };
        assert!(validate_create_request(&request).is_err());
    }

    #[test]
    fn accepts_well_formed_request() {
        let request = CreateOrderRequest {
            customer_id: "cust_1".to_string(),
            items: vec![LineItemRequest {
                product_id: "sku_1".to_string(),
                quantity: 2,
                unit_price: 9.99,
            }],
        };
        assert!(validate_create_request(&request).is_ok());
    }
}

//! Order read endpoints and admin fulfillment.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::{Aggregate, Order, OrderLine, OrderStatus, PaymentStatus, SelectedOptions};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::parse_aggregate_id;
use crate::error::ApiError;
use crate::extract::Identity;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct FulfillmentRequest {
    pub status: OrderStatus,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub owner: String,
    pub status: OrderStatus,
    pub payment: PaymentResponse,
    pub lines: Vec<OrderLineResponse>,
    pub sub_total_cents: i64,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub placed_at: Option<String>,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub status: PaymentStatus,
    pub gateway: Option<String>,
    pub session_id: Option<String>,
    pub transaction_id: Option<String>,
    pub refund_id: Option<String>,
    pub refunded_amount_cents: Option<i64>,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: String,
    pub title: String,
    pub quantity: u32,
    pub price_cents: i64,
    pub line_total_cents: i64,
    pub selected_options: SelectedOptions,
}

impl From<&OrderLine> for OrderLineResponse {
    fn from(line: &OrderLine) -> Self {
        Self {
            product_id: line.product_id.to_string(),
            title: line.title.clone(),
            quantity: line.quantity,
            price_cents: line.price.cents(),
            line_total_cents: line.line_total().cents(),
            selected_options: line.selected_options.clone(),
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        let payment = order.payment();
        Self {
            id: order.id().map(|id| id.to_string()).unwrap_or_default(),
            owner: order.owner().map(|o| o.to_string()).unwrap_or_default(),
            status: order.status(),
            payment: PaymentResponse {
                status: payment.status,
                gateway: payment.gateway.clone(),
                session_id: payment.session_id.clone(),
                transaction_id: payment.transaction_id.clone(),
                refund_id: payment.refund_id.clone(),
                refunded_amount_cents: payment.refunded_amount.map(|m| m.cents()),
            },
            lines: order.lines().iter().map(OrderLineResponse::from).collect(),
            sub_total_cents: order.sub_total().cents(),
            metadata: order.metadata().clone(),
            placed_at: order.placed_at().map(|t| t.to_rfc3339()),
        }
    }
}

/// Response type for event envelope data.
#[derive(Serialize)]
pub struct EventEnvelopeResponse {
    pub event_id: String,
    pub event_type: String,
    pub aggregate_id: String,
    pub version: i64,
    pub timestamp: String,
    pub payload: serde_json::Value,
}

// -- Handlers --

/// GET /orders: the caller's orders, or every order for an admin.
#[tracing::instrument(skip(state), fields(user = %identity.0.user_id))]
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    // Run catch-up so the listing includes orders placed moments ago
    state.projection_processor.run_catch_up().await?;

    let caller = identity.0;
    let order_ids = if caller.is_admin() {
        state.customer_orders.all_orders().await
    } else {
        state.customer_orders.orders_for(caller.user_id).await
    };

    let mut responses = Vec::with_capacity(order_ids.len());
    for order_id in order_ids {
        let order = state.orders.get(order_id).await?;
        responses.push(OrderResponse::from(&order));
    }
    Ok(Json(responses))
}

/// GET /orders/:id: one order, visible to its owner and to admins.
#[tracing::instrument(skip(state), fields(user = %identity.0.user_id))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    let order = state.orders.get(order_id).await?;

    let caller = identity.0;
    if !caller.is_admin() && !order.is_owned_by(caller.user_id) {
        return Err(ApiError::Forbidden(format!("Order {id} belongs to another user")));
    }
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders/:id/events: the order's raw event history (admin).
#[tracing::instrument(skip(state), fields(user = %identity.0.user_id))]
pub async fn events<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Vec<EventEnvelopeResponse>>, ApiError> {
    identity.require_admin()?;
    let order_id = parse_aggregate_id(&id)?;

    let envelopes = state.orders.history(order_id).await?;
    if envelopes
        .first()
        .is_none_or(|e| !e.belongs_to(Order::aggregate_type()))
    {
        return Err(ApiError::NotFound(format!("Order {id} not found")));
    }

    let responses = envelopes
        .into_iter()
        .map(|e| EventEnvelopeResponse {
            event_id: e.event_id.to_string(),
            event_type: e.event_type,
            aggregate_id: e.aggregate_id.to_string(),
            version: e.version.as_i64(),
            timestamp: e.timestamp.to_rfc3339(),
            payload: e.payload,
        })
        .collect();

    Ok(Json(responses))
}

/// POST /orders/:id/fulfillment: advance a paid order to shipped or
/// delivered (admin).
#[tracing::instrument(skip(state, req), fields(user = %identity.0.user_id))]
pub async fn fulfill<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<FulfillmentRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    identity.require_admin()?;
    let order_id = parse_aggregate_id(&id)?;

    let result = state
        .orders
        .advance_fulfillment(order_id, req.status)
        .await?;
    Ok(Json(OrderResponse::from(&result.aggregate)))
}

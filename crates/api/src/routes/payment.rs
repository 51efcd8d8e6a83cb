//! Hosted payment sessions, verification, refunds and the gateway webhook.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use checkout::webhook::SIGNATURE_HEADER;
use checkout::{SessionPaymentStatus, SessionStatus, Transition};
use domain::Money;
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::orders::OrderResponse;
use super::parse_aggregate_id;
use crate::error::ApiError;
use crate::extract::Identity;
use crate::state::{AppState, PublicPaymentConfig};

// -- Request types --

#[derive(Deserialize, Default)]
pub struct CheckoutSessionRequest {
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
pub struct RefundRequest {
    pub order_id: String,
    /// Omitted for a full refund.
    pub amount_cents: Option<i64>,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutSessionResponse {
    pub order_id: String,
    pub session_id: String,
    pub redirect_url: Option<String>,
    pub sub_total_cents: i64,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub payment_status: SessionPaymentStatus,
    pub session_status: SessionStatus,
    pub order: OrderResponse,
}

#[derive(Serialize)]
pub struct RefundResponse {
    pub order_id: String,
    pub refund_id: String,
    pub amount_cents: Option<i64>,
    pub outcome: Transition,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub outcome: Transition,
}

// -- Handlers --

/// GET /payment/config: public gateway settings for the storefront.
pub async fn config<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<PublicPaymentConfig> {
    Json(state.payment_config.clone())
}

/// POST /payment/checkout-session: check out the cart and open a hosted
/// payment session for the new order.
#[tracing::instrument(skip(state, req), fields(user = %identity.0.user_id))]
pub async fn checkout_session<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(req): Json<CheckoutSessionRequest>,
) -> Result<(StatusCode, Json<CheckoutSessionResponse>), ApiError> {
    let session = state
        .payments
        .start_checkout_session(&identity.0, req.metadata)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutSessionResponse {
            order_id: session.order_id.to_string(),
            session_id: session.session_id,
            redirect_url: session.redirect_url,
            sub_total_cents: session.sub_total.cents(),
        }),
    ))
}

/// GET /payment/verify/:session_id: live session state plus the order.
#[tracing::instrument(skip(state), fields(user = %identity.0.user_id))]
pub async fn verify<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(session_id): Path<String>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let verification = state
        .payments
        .verify_session(&identity.0, &session_id)
        .await?;

    Ok(Json(VerifyResponse {
        payment_status: verification.payment_status,
        session_status: verification.session_status,
        order: OrderResponse::from(&verification.order),
    }))
}

/// POST /payment/refund: refund a paid order in full or in part.
#[tracing::instrument(skip(state, req), fields(user = %identity.0.user_id))]
pub async fn refund<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(req): Json<RefundRequest>,
) -> Result<Json<RefundResponse>, ApiError> {
    let order_id = parse_aggregate_id(&req.order_id)?;
    let receipt = state
        .payments
        .request_refund(&identity.0, order_id, req.amount_cents.map(Money::from_cents))
        .await?;

    Ok(Json(RefundResponse {
        order_id: receipt.order_id.to_string(),
        refund_id: receipt.refund_id,
        amount_cents: receipt.amount.map(|m| m.cents()),
        outcome: receipt.transition,
    }))
}

/// POST /payment/webhook: signed gateway notifications. The raw body is
/// what the signature covers, so it is taken as bytes.
#[tracing::instrument(skip_all)]
pub async fn webhook<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let outcome = state.payments.handle_webhook(&body, signature).await?;

    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}

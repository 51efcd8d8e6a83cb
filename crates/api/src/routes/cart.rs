//! Cart endpoints and cart-to-order checkout.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::{CheckoutReceipt, CheckoutRequest};
use domain::{
    AddCartItem, Aggregate, Cart, CartItem, CartItemId, ProductId, RemoveCartItem,
    SelectedOptions, SetItemQuantity,
};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::orders::OrderLineResponse;
use super::parse_uuid;
use crate::error::ApiError;
use crate::extract::Identity;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub selected_options: SelectedOptions,
}

#[derive(Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: i64,
}

#[derive(Deserialize, Default)]
pub struct CheckoutBody {
    pub gateway: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub id: String,
    pub owner: String,
    pub items: Vec<CartItemResponse>,
    pub total_quantity: u32,
    pub sub_total_cents: i64,
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub item_id: String,
    pub product_id: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub quantity: u32,
    pub price_cents: i64,
    pub line_total_cents: i64,
    pub selected_options: SelectedOptions,
}

impl From<&CartItem> for CartItemResponse {
    fn from(item: &CartItem) -> Self {
        Self {
            item_id: item.item_id.to_string(),
            product_id: item.product_id.to_string(),
            title: item.title.clone(),
            thumbnail: item.thumbnail.clone(),
            quantity: item.quantity,
            price_cents: item.price.cents(),
            line_total_cents: item.line_total().cents(),
            selected_options: item.selected_options.clone(),
        }
    }
}

impl From<&Cart> for CartResponse {
    fn from(cart: &Cart) -> Self {
        Self {
            id: cart.id().map(|id| id.to_string()).unwrap_or_default(),
            owner: cart.owner().map(|o| o.to_string()).unwrap_or_default(),
            items: cart.items().iter().map(CartItemResponse::from).collect(),
            total_quantity: cart.total_quantity(),
            sub_total_cents: cart.sub_total().cents(),
        }
    }
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order_id: String,
    pub sub_total_cents: i64,
    pub lines: Vec<OrderLineResponse>,
}

impl From<&CheckoutReceipt> for CheckoutResponse {
    fn from(receipt: &CheckoutReceipt) -> Self {
        Self {
            order_id: receipt.order_id.to_string(),
            sub_total_cents: receipt.sub_total.cents(),
            lines: receipt.lines.iter().map(OrderLineResponse::from).collect(),
        }
    }
}

fn parse_item_id(id: &str) -> Result<CartItemId, ApiError> {
    parse_uuid("cart item", id).map(CartItemId::from_uuid)
}

// -- Handlers --

/// GET /cart: the caller's cart, opened on first access.
#[tracing::instrument(skip(state), fields(user = %identity.0.user_id))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.get_or_create(identity.0.user_id).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /cart/items: add a product, merging with an identical line.
#[tracing::instrument(skip(state, req), fields(user = %identity.0.user_id))]
pub async fn add_item<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let product_id = parse_uuid("product", &req.product_id).map(ProductId::from_uuid)?;
    let cart = state
        .carts
        .add_item(AddCartItem {
            owner: identity.0.user_id,
            product_id,
            quantity: req.quantity,
            selected_options: req.selected_options,
        })
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// PATCH /cart/items/:item_id: replace a line's quantity.
#[tracing::instrument(skip(state, req), fields(user = %identity.0.user_id))]
pub async fn set_quantity<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(item_id): Path<String>,
    Json(req): Json<SetQuantityRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .carts
        .set_item_quantity(SetItemQuantity {
            owner: identity.0.user_id,
            item_id: parse_item_id(&item_id)?,
            quantity: req.quantity,
        })
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// DELETE /cart/items/:item_id
#[tracing::instrument(skip(state), fields(user = %identity.0.user_id))]
pub async fn remove_item<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(item_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .carts
        .remove_item(RemoveCartItem {
            owner: identity.0.user_id,
            item_id: parse_item_id(&item_id)?,
        })
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// DELETE /cart: empty the cart.
#[tracing::instrument(skip(state), fields(user = %identity.0.user_id))]
pub async fn clear<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.clear(identity.0.user_id).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /cart/checkout: turn the cart into a pending order without
/// opening a payment session.
#[tracing::instrument(skip(state, body), fields(user = %identity.0.user_id))]
pub async fn checkout<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(body): Json<CheckoutBody>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let receipt = state
        .checkout
        .checkout(
            identity.0.user_id,
            CheckoutRequest {
                gateway: body.gateway,
                metadata: body.metadata,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(CheckoutResponse::from(&receipt))))
}

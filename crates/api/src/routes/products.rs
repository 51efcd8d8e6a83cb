//! Catalog endpoints. Writes are admin-only.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{Money, Product, ProductId, RegisterProduct};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::parse_uuid;
use crate::error::ApiError;
use crate::extract::Identity;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub title: String,
    pub price_cents: i64,
    pub stock: u32,
    pub thumbnail: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdatePriceRequest {
    pub price_cents: i64,
}

#[derive(Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub title: String,
    pub price_cents: i64,
    pub stock: u32,
    pub thumbnail: Option<String>,
}

impl From<&Product> for ProductResponse {
    fn from(product: &Product) -> Self {
        Self {
            id: product
                .product_id()
                .map(|id| id.to_string())
                .unwrap_or_default(),
            title: product.title().to_string(),
            price_cents: product.price().cents(),
            stock: product.stock(),
            thumbnail: product.thumbnail().map(str::to_string),
        }
    }
}

fn parse_product_id(id: &str) -> Result<ProductId, ApiError> {
    parse_uuid("product", id).map(ProductId::from_uuid)
}

/// POST /products (admin)
#[tracing::instrument(skip(state, req), fields(user = %identity.0.user_id))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    identity.require_admin()?;
    let product = state
        .products
        .register_product(RegisterProduct {
            product_id: ProductId::new(),
            title: req.title,
            price: Money::from_cents(req.price_cents),
            stock: req.stock,
            thumbnail: req.thumbnail,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(ProductResponse::from(&product))))
}

/// GET /products/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state.products.get(parse_product_id(&id)?).await?;
    Ok(Json(ProductResponse::from(&product)))
}

/// PATCH /products/:id: change the price (admin). Carts keep the price they
/// captured; checkout charges the new one.
#[tracing::instrument(skip(state, req), fields(user = %identity.0.user_id))]
pub async fn update_price<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<UpdatePriceRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    identity.require_admin()?;
    let product = state
        .products
        .change_price(parse_product_id(&id)?, Money::from_cents(req.price_cents))
        .await?;
    Ok(Json(ProductResponse::from(&product)))
}

/// POST /products/:id/stock: add stock (admin).
#[tracing::instrument(skip(state, req), fields(user = %identity.0.user_id))]
pub async fn restock<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<RestockRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    identity.require_admin()?;
    let product = state
        .products
        .increment(parse_product_id(&id)?, req.quantity)
        .await?;
    Ok(Json(ProductResponse::from(&product)))
}

//! HTTP API for the storefront core.
//!
//! Cart, checkout, payment and order endpoints over the event-sourced
//! domain, with structured logging (tracing) and Prometheus metrics. Caller
//! identity comes from trusted upstream headers (see [`extract`]).

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use checkout::PaymentGateway;
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::ApiError;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        // Cart
        .route(
            "/cart",
            get(routes::cart::get::<S>).delete(routes::cart::clear::<S>),
        )
        .route("/cart/items", post(routes::cart::add_item::<S>))
        .route(
            "/cart/items/{item_id}",
            patch(routes::cart::set_quantity::<S>).delete(routes::cart::remove_item::<S>),
        )
        .route("/cart/checkout", post(routes::cart::checkout::<S>))
        // Payment
        .route("/payment/config", get(routes::payment::config::<S>))
        .route(
            "/payment/checkout-session",
            post(routes::payment::checkout_session::<S>),
        )
        .route(
            "/payment/verify/{session_id}",
            get(routes::payment::verify::<S>),
        )
        .route("/payment/refund", post(routes::payment::refund::<S>))
        .route("/payment/webhook", post(routes::payment::webhook::<S>))
        // Orders
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/events", get(routes::orders::events::<S>))
        .route(
            "/orders/{id}/fulfillment",
            post(routes::orders::fulfill::<S>),
        )
        // Products
        .route("/products", post(routes::products::create::<S>))
        .route(
            "/products/{id}",
            get(routes::products::get::<S>).patch(routes::products::update_price::<S>),
        )
        .route("/products/{id}/stock", post(routes::products::restock::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over `event_store`, paying through
/// `gateway`.
pub fn create_default_state<S: EventStore + Clone + 'static>(
    event_store: S,
    gateway: Arc<dyn PaymentGateway>,
    config: &Config,
) -> Arc<AppState<S>> {
    Arc::new(AppState::new(event_store, gateway, config))
}

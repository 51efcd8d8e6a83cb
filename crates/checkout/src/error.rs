//! Checkout error types.
//!
//! [`CheckoutError`] is the taxonomy callers see. Gateway failures stay a
//! distinct variant so "your request was invalid" can be told apart from
//! "the payment provider is unavailable, retry".

use common::AggregateId;
use domain::{CartError, DomainError, OrderError, ProductError, ProductId};
use projections::ProjectionError;
use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Out of stock: {product_id} (requested {requested}, available {available})")]
    OutOfStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Another checkout changed the product's stock between read and commit.
    #[error("Stock for {product_id} changed during checkout, retry")]
    ConcurrentStockConflict { product_id: ProductId },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The gateway refused a session and abandoning the new order failed
    /// as well. The order stays pending with its stock held.
    #[error("{gateway}; abandoning order {order_id} failed: {compensation}")]
    CompensationFailed {
        order_id: AggregateId,
        gateway: GatewayError,
        compensation: Box<CheckoutError>,
    },

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Read model error: {0}")]
    ReadModel(#[from] ProjectionError),

    #[error("Domain error: {0}")]
    Domain(DomainError),
}

impl CheckoutError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CheckoutError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// A version conflict that re-running the operation may resolve.
    pub fn is_retryable_conflict(&self) -> bool {
        matches!(self, CheckoutError::Domain(e) if e.is_concurrency_conflict())
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            CheckoutError::Validation(_) => "validation",
            CheckoutError::NotFound { .. } => "not_found",
            CheckoutError::Authorization(_) => "authorization",
            CheckoutError::EmptyCart => "empty_cart",
            CheckoutError::OutOfStock { .. } => "out_of_stock",
            CheckoutError::ConcurrentStockConflict { .. } => "stock_conflict",
            CheckoutError::InvalidState(_) => "invalid_state",
            CheckoutError::Precondition(_) => "precondition",
            CheckoutError::Gateway(_) => "gateway",
            CheckoutError::CompensationFailed { .. } => "compensation_failed",
            CheckoutError::InvalidSignature(_) => "invalid_signature",
            CheckoutError::ReadModel(_) => "read_model",
            CheckoutError::Domain(e) if e.is_concurrency_conflict() => "conflict",
            CheckoutError::Domain(_) => "domain",
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::AggregateNotFound {
                aggregate_type,
                aggregate_id,
            } => CheckoutError::NotFound {
                entity: aggregate_type,
                id: aggregate_id,
            },
            DomainError::Cart(CartError::EmptyCart) => CheckoutError::EmptyCart,
            DomainError::Cart(CartError::ItemNotFound(item_id)) => {
                CheckoutError::not_found("Cart item", item_id)
            }
            DomainError::Cart(e @ (CartError::InvalidQuantity { .. } | CartError::AmountTooLarge)) => {
                CheckoutError::Validation(e.to_string())
            }
            DomainError::Product(ProductError::NotFound(product_id)) => {
                CheckoutError::not_found("Product", product_id)
            }
            DomainError::Product(ProductError::InsufficientStock {
                product_id,
                requested,
                available,
            }) => CheckoutError::OutOfStock {
                product_id,
                requested,
                available,
            },
            DomainError::Product(
                e @ (ProductError::TitleRequired
                | ProductError::InvalidPrice { .. }
                | ProductError::InvalidQuantity { .. }),
            ) => CheckoutError::Validation(e.to_string()),
            DomainError::Order(e @ OrderError::AmountTooLarge) => {
                CheckoutError::Validation(e.to_string())
            }
            DomainError::Order(
                e @ (OrderError::InvalidStateTransition { .. }
                | OrderError::InvalidFulfillmentTarget(_)),
            ) => CheckoutError::InvalidState(e.to_string()),
            other => CheckoutError::Domain(other),
        }
    }
}

impl From<CartError> for CheckoutError {
    fn from(err: CartError) -> Self {
        DomainError::from(err).into()
    }
}

impl From<ProductError> for CheckoutError {
    fn from(err: ProductError) -> Self {
        DomainError::from(err).into()
    }
}

impl From<OrderError> for CheckoutError {
    fn from(err: OrderError) -> Self {
        DomainError::from(err).into()
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;

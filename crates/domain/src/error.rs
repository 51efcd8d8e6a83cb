//! Domain error types.

use common::AggregateId;
use event_store::EventStoreError;
use thiserror::Error;

use crate::cart::CartError;
use crate::order::OrderError;
use crate::product::ProductError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Product error: {0}")]
    Product(#[from] ProductError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn not_found(aggregate_type: &'static str, aggregate_id: impl ToString) -> Self {
        DomainError::AggregateNotFound {
            aggregate_type,
            aggregate_id: aggregate_id.to_string(),
        }
    }

    /// The stream that was written concurrently, if this is a version conflict.
    pub fn conflicting_aggregate(&self) -> Option<AggregateId> {
        match self {
            DomainError::EventStore(e) => e.conflicting_aggregate(),
            _ => None,
        }
    }

    pub fn is_concurrency_conflict(&self) -> bool {
        self.conflicting_aggregate().is_some()
    }
}

use thiserror::Error;

use crate::{AggregateId, Version};

/// Failures surfaced by an [`EventStore`](crate::EventStore).
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The stream was written by someone else since it was read.
    #[error("stream {aggregate_id} moved on: expected {expected}, found {actual}")]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    #[error("no events for stream {0}")]
    AggregateNotFound(AggregateId),

    /// The batch handed to `append`/`append_all` is malformed.
    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("event payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// The aggregate whose expected version did not hold, if this is a conflict.
    pub fn conflicting_aggregate(&self) -> Option<AggregateId> {
        match self {
            EventStoreError::ConcurrencyConflict { aggregate_id, .. } => Some(*aggregate_id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EventStoreError>;

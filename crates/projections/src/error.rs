use thiserror::Error;

/// Failures while feeding events into the read models.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("reading the event log: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// An order event payload did not match any known event shape.
    #[error("undecodable event payload: {0}")]
    Deserialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProjectionError>;

//! Projection and read model traits.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;

/// How far into the global event sequence a projection has read.
///
/// Holds the store position of the last event applied. Store positions grow
/// in commit order, so every event at or below it has been seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProjectionPosition {
    pub last_position: u64,
}

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Moves past the event stored at `position`. Never moves backwards.
    pub fn advance_to(&self, position: u64) -> Self {
        Self {
            last_position: self.last_position.max(position),
        }
    }

    /// True if the event stored at `position` has not been seen yet.
    pub fn is_behind(&self, position: u64) -> bool {
        self.last_position < position
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.last_position)
    }
}

/// Folds store events into a query-side view.
///
/// `handle` is called once per event in store position order and must
/// advance to the event's position even for events the view ignores.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;

    /// Drops all derived state and rewinds to position zero.
    async fn reset(&self) -> Result<()>;
}

/// Query access to a view's size, for health reporting.
pub trait ReadModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of entries; zero while a writer holds the view.
    fn count(&self) -> usize;
}

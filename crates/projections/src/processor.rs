//! Projection processor for feeding events to projections.

use event_store::{EventEnvelope, EventStore};
use futures_util::StreamExt;
use tokio::sync::Mutex;

use crate::Result;
use crate::projection::Projection;

/// Processes events from an event store and delivers them to projections.
///
/// The processor supports:
/// - Catch-up: reads the store from the lowest projection position onwards,
///   delivering each event only to projections that have not seen it yet
/// - Single event delivery: delivers a new event to all projections
/// - Rebuild: resets all projections and replays from scratch
///
/// Catch-up runs are serialized so two callers never deliver the same event
/// twice to a projection.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
    catch_up: Mutex<()>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
            catch_up: Mutex::new(()),
        }
    }

    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Streams the events past the furthest-behind projection and delivers
    /// each to every projection that hasn't already seen it. Returns the
    /// number of deliveries made.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let _guard = self.catch_up.lock().await;

        let mut from: Option<u64> = None;
        for projection in &self.projections {
            let last = projection.position().await.last_position;
            from = Some(from.map_or(last, |f| f.min(last)));
        }
        let Some(from) = from else {
            return Ok(0);
        };

        let mut stream = self.store.stream_events_after(from).await?;
        let mut events_seen: u64 = 0;
        let mut delivered: u64 = 0;

        while let Some(result) = stream.next().await {
            let event = result?;
            events_seen += 1;

            for projection in &self.projections {
                let pos = projection.position().await;
                if pos.is_behind(event.position) {
                    projection.handle(&event).await?;
                    delivered += 1;
                    metrics::counter!(
                        "projections_events_processed",
                        "projection" => projection.name()
                    )
                    .increment(1);
                }
            }
        }

        if delivered > 0 {
            tracing::debug!(from, events_seen, delivered, "catch-up complete");
        }

        Ok(delivered)
    }

    /// Delivers a single event to all registered projections.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            projection.handle(event).await?;
        }
        Ok(())
    }

    /// Resets all projections and replays all events from the store.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<()> {
        for projection in &self.projections {
            projection.reset().await?;
        }
        let delivered = self.run_catch_up().await?;
        tracing::info!(delivered, "projections rebuilt");
        Ok(())
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Snapshot, Version,
    store::{AppendBatch, EventStore, EventStream, validate_batches},
};

/// In-memory event store.
///
/// Events live in a single insertion-ordered log behind one lock, so a
/// multi-aggregate append is checked and applied under the same write guard.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<EventEnvelope>>>,
    snapshots: Arc<RwLock<HashMap<AggregateId, Snapshot>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    fn current_version(log: &[EventEnvelope], aggregate_id: AggregateId) -> Version {
        log.iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max()
            .unwrap_or(Version::initial())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_all(&self, batches: Vec<AppendBatch>) -> Result<Vec<Version>> {
        validate_batches(&batches)?;

        let mut log = self.events.write().await;

        // Check every stream before touching any of them.
        for batch in &batches {
            let first = &batch.events[0];
            let current = Self::current_version(&log, first.aggregate_id);

            if let Some(expected) = batch.options.expected_version
                && current != expected
            {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: first.aggregate_id,
                    expected,
                    actual: current,
                });
            }

            // (aggregate_id, version) is unique, as in the Postgres schema.
            if first.version <= current {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: first.aggregate_id,
                    expected: batch.options.expected_version.unwrap_or(current),
                    actual: current,
                });
            }
        }

        let mut versions = Vec::with_capacity(batches.len());
        for batch in batches {
            if let Some(last) = batch.events.last() {
                versions.push(last.version);
            }
            for mut event in batch.events {
                event.position = log.len() as u64 + 1;
                log.push(event);
            }
        }

        Ok(versions)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        self.get_events_for_aggregate_from_version(aggregate_id, Version::first())
            .await
    }

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let log = self.events.read().await;
        let mut events: Vec<_> = log
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id && e.version >= from_version)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn stream_events_after(&self, after: u64) -> Result<EventStream> {
        use futures_util::stream;

        // Position n sits at index n - 1.
        let log = self.events.read().await;
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(log.len());
        let events = log[start..].to_vec();
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let log = self.events.read().await;
        Ok(log
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max())
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.aggregate_id, snapshot);
        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        Ok(self.snapshots.read().await.get(&aggregate_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AppendOptions;

    fn event(aggregate_id: AggregateId, version: i64, event_type: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Product")
            .event_type(event_type)
            .version(Version::new(version))
            .payload_raw(serde_json::json!({"test": true}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn append_returns_last_version() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let version = store
            .append(
                vec![event(id, 1, "ProductRegistered"), event(id, 2, "PriceChanged")],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();

        assert_eq!(version, Version::new(2));
        assert_eq!(store.get_events_for_aggregate(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stale_expected_version_is_a_conflict() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(vec![event(id, 1, "ProductRegistered")], AppendOptions::expect_new())
            .await
            .unwrap();

        let result = store
            .append(
                vec![event(id, 2, "StockDecremented")],
                AppendOptions::expect_version(Version::initial()),
            )
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { aggregate_id, .. }) if aggregate_id == id
        ));
    }

    #[tokio::test]
    async fn append_all_writes_every_batch() {
        let store = InMemoryEventStore::new();
        let product = AggregateId::new();
        let order = AggregateId::new();
        store
            .append(vec![event(product, 1, "ProductRegistered")], AppendOptions::expect_new())
            .await
            .unwrap();

        let versions = store
            .append_all(vec![
                AppendBatch::new(vec![event(order, 1, "OrderPlaced")], AppendOptions::expect_new()),
                AppendBatch::new(
                    vec![event(product, 2, "StockDecremented")],
                    AppendOptions::expect_version(Version::first()),
                ),
            ])
            .await
            .unwrap();

        assert_eq!(versions, vec![Version::new(1), Version::new(2)]);
        assert_eq!(store.event_count().await, 3);
    }

    #[tokio::test]
    async fn append_all_is_all_or_nothing() {
        let store = InMemoryEventStore::new();
        let product = AggregateId::new();
        let order = AggregateId::new();
        store
            .append(
                vec![event(product, 1, "ProductRegistered"), event(product, 2, "StockDecremented")],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();

        // The product batch was prepared against version 1 but the stream is at 2.
        let result = store
            .append_all(vec![
                AppendBatch::new(vec![event(order, 1, "OrderPlaced")], AppendOptions::expect_new()),
                AppendBatch::new(
                    vec![event(product, 2, "StockDecremented")],
                    AppendOptions::expect_version(Version::first()),
                ),
            ])
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.conflicting_aggregate(), Some(product));
        assert!(store.get_events_for_aggregate(order).await.unwrap().is_empty());
        assert_eq!(store.event_count().await, 2);
    }

    #[tokio::test]
    async fn duplicate_version_without_expectation_is_rejected() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(vec![event(id, 1, "ProductRegistered")], AppendOptions::new())
            .await
            .unwrap();

        let result = store
            .append(vec![event(id, 1, "ProductRegistered")], AppendOptions::new())
            .await;
        assert!(matches!(result, Err(EventStoreError::ConcurrencyConflict { .. })));
    }

    #[tokio::test]
    async fn get_events_from_version() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(
                vec![event(id, 1, "A"), event(id, 2, "B"), event(id, 3, "C")],
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let from_v2 = store
            .get_events_for_aggregate_from_version(id, Version::new(2))
            .await
            .unwrap();
        assert_eq!(from_v2.len(), 2);
        assert_eq!(from_v2[0].version, Version::new(2));
    }

    #[tokio::test]
    async fn stream_all_events_preserves_insertion_order() {
        use futures_util::StreamExt;

        let store = InMemoryEventStore::new();
        let first = AggregateId::new();
        let second = AggregateId::new();
        store
            .append(vec![event(second, 1, "OrderPlaced")], AppendOptions::new())
            .await
            .unwrap();
        store
            .append(vec![event(first, 1, "ProductRegistered")], AppendOptions::new())
            .await
            .unwrap();
        store
            .append(vec![event(second, 2, "PaymentSucceeded")], AppendOptions::new())
            .await
            .unwrap();

        let types: Vec<String> = store
            .stream_all_events()
            .await
            .unwrap()
            .map(|e| e.unwrap().event_type)
            .collect()
            .await;
        assert_eq!(types, vec!["OrderPlaced", "ProductRegistered", "PaymentSucceeded"]);
    }

    #[tokio::test]
    async fn stream_events_after_resumes_past_the_last_position() {
        use futures_util::StreamExt;

        let store = InMemoryEventStore::new();
        let product = AggregateId::new();
        let order = AggregateId::new();
        store
            .append(vec![event(product, 1, "ProductRegistered")], AppendOptions::new())
            .await
            .unwrap();
        store
            .append_all(vec![
                AppendBatch::new(vec![event(order, 1, "OrderPlaced")], AppendOptions::expect_new()),
                AppendBatch::new(
                    vec![event(product, 2, "StockDecremented")],
                    AppendOptions::expect_version(Version::first()),
                ),
            ])
            .await
            .unwrap();

        let tail: Vec<(u64, String)> = store
            .stream_events_after(1)
            .await
            .unwrap()
            .map(|e| e.map(|e| (e.position, e.event_type)).unwrap())
            .collect()
            .await;
        assert_eq!(
            tail,
            vec![(2, "OrderPlaced".to_string()), (3, "StockDecremented".to_string())]
        );

        let past_the_end = store.stream_events_after(3).await.unwrap();
        assert_eq!(past_the_end.count().await, 0);
    }

    #[tokio::test]
    async fn snapshot_save_and_retrieve() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        assert!(store.get_snapshot(id).await.unwrap().is_none());

        let snapshot =
            Snapshot::from_state(id, "Cart", Version::new(5), &serde_json::json!({"items": []}))
                .unwrap();
        store.save_snapshot(snapshot).await.unwrap();

        let retrieved = store.get_snapshot(id).await.unwrap().unwrap();
        assert_eq!(retrieved.version, Version::new(5));
    }

    #[tokio::test]
    async fn get_aggregate_version() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        assert!(store.get_aggregate_version(id).await.unwrap().is_none());

        store
            .append(vec![event(id, 1, "A"), event(id, 2, "B")], AppendOptions::new())
            .await
            .unwrap();
        assert_eq!(
            store.get_aggregate_version(id).await.unwrap(),
            Some(Version::new(2))
        );
    }
}

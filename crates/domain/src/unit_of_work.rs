//! Multi-aggregate transaction boundary.
//!
//! A [`UnitOfWork`] loads several aggregates, records the events each
//! command produces against them and commits everything with a single
//! [`EventStore::append_all`]. Each stream is guarded by the version it was
//! loaded at, so a concurrent write to any of them fails the whole commit and
//! nothing is persisted.

use common::AggregateId;
use event_store::{AppendBatch, AppendOptions, EventStore, Version};
use serde::de::DeserializeOwned;

use crate::aggregate::Aggregate;
use crate::command::{build_envelopes, rehydrate};
use crate::error::DomainError;

pub struct UnitOfWork<'a, S: EventStore + ?Sized> {
    store: &'a S,
    batches: Vec<AppendBatch>,
}

impl<'a, S: EventStore + ?Sized> UnitOfWork<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            batches: Vec::new(),
        }
    }

    /// Loads an aggregate at its current version.
    pub async fn load<A>(&self, aggregate_id: AggregateId) -> Result<A, DomainError>
    where
        A: Aggregate + DeserializeOwned,
    {
        rehydrate(self.store, aggregate_id).await
    }

    /// Stages events for `aggregate` and applies them to it.
    ///
    /// Recording several times against the same aggregate extends one batch;
    /// the batch stays guarded by the version the aggregate was loaded at.
    pub fn record<A: Aggregate>(
        &mut self,
        aggregate_id: AggregateId,
        aggregate: &mut A,
        events: Vec<A::Event>,
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let from_version = aggregate.version();
        let envelopes = build_envelopes::<A>(aggregate_id, from_version, &events)?;
        let new_version = envelopes
            .last()
            .map(|e| e.version)
            .unwrap_or(from_version);

        match self
            .batches
            .iter_mut()
            .find(|b| b.aggregate_id() == Some(aggregate_id))
        {
            Some(batch) => batch.events.extend(envelopes),
            None => self.batches.push(AppendBatch::new(
                envelopes,
                AppendOptions::expect_version(from_version),
            )),
        }

        aggregate.apply_events(events);
        aggregate.set_version(new_version);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Streams touched so far.
    pub fn touched(&self) -> impl Iterator<Item = AggregateId> + '_ {
        self.batches.iter().filter_map(AppendBatch::aggregate_id)
    }

    /// Appends every staged batch atomically.
    ///
    /// Returns the new version per touched stream. Committing an empty unit
    /// writes nothing.
    pub async fn commit(self) -> Result<Vec<(AggregateId, Version)>, DomainError> {
        if self.batches.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<AggregateId> = self.touched().collect();
        let versions = self.store.append_all(self.batches).await?;
        Ok(ids.into_iter().zip(versions).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::Product;
    use crate::values::{Money, ProductId};
    use event_store::InMemoryEventStore;

    async fn seed_product(store: &InMemoryEventStore, stock: u32) -> ProductId {
        let product_id = ProductId::new();
        let mut uow = UnitOfWork::new(store);
        let mut product = Product::default();
        let events = product
            .register(product_id, "Mug".to_string(), Money::from_cents(1200), stock, None)
            .unwrap();
        uow.record(product_id.into(), &mut product, events).unwrap();
        uow.commit().await.unwrap();
        product_id
    }

    #[tokio::test]
    async fn repeated_records_share_one_guarded_batch() {
        let store = InMemoryEventStore::new();
        let product_id = seed_product(&store, 5).await;

        let mut uow = UnitOfWork::new(&store);
        let mut product: Product = uow.load(product_id.into()).await.unwrap();
        let first = product.decrement_stock(2, None).unwrap();
        uow.record(product_id.into(), &mut product, first).unwrap();
        let second = product.decrement_stock(1, None).unwrap();
        uow.record(product_id.into(), &mut product, second).unwrap();

        assert_eq!(product.stock(), 2);
        let versions = uow.commit().await.unwrap();
        assert_eq!(versions, vec![(product_id.into(), Version::new(3))]);
    }

    #[tokio::test]
    async fn commit_fails_when_a_stream_moved_underneath() {
        let store = InMemoryEventStore::new();
        let product_id = seed_product(&store, 5).await;

        let mut slow = UnitOfWork::new(&store);
        let mut stale: Product = slow.load(product_id.into()).await.unwrap();

        let mut fast = UnitOfWork::new(&store);
        let mut fresh: Product = fast.load(product_id.into()).await.unwrap();
        let events = fresh.decrement_stock(5, None).unwrap();
        fast.record(product_id.into(), &mut fresh, events).unwrap();
        fast.commit().await.unwrap();

        let events = stale.decrement_stock(5, None).unwrap();
        slow.record(product_id.into(), &mut stale, events).unwrap();
        let err = slow.commit().await.unwrap_err();

        assert_eq!(err.conflicting_aggregate(), Some(product_id.into()));
        let reloaded: Product = UnitOfWork::new(&store).load(product_id.into()).await.unwrap();
        assert_eq!(reloaded.stock(), 0);
    }

    #[tokio::test]
    async fn empty_unit_commits_nothing() {
        let store = InMemoryEventStore::new();
        let uow = UnitOfWork::new(&store);
        assert!(uow.is_empty());
        assert!(uow.commit().await.unwrap().is_empty());
        assert_eq!(store.event_count().await, 0);
    }
}

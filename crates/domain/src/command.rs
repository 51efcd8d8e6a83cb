//! Command handling infrastructure.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, EventStoreExt, Snapshot, Version};
use serde::de::DeserializeOwned;

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::error::DomainError;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were persisted. Empty when the command was a no-op.
    pub events: Vec<A::Event>,

    pub new_version: Version,
}

/// An intention to change one aggregate.
pub trait Command: Send + Sync {
    type Aggregate: Aggregate;

    fn aggregate_id(&self) -> AggregateId;
}

/// Rebuilds an aggregate from its snapshot (if any) and the events after it.
///
/// A stream with no events yields `A::default()`.
pub async fn rehydrate<S, A>(store: &S, aggregate_id: AggregateId) -> Result<A, DomainError>
where
    S: EventStore + ?Sized,
    A: Aggregate + DeserializeOwned,
{
    let (snapshot, events) = store.load_aggregate(aggregate_id).await?;

    let mut aggregate = match snapshot {
        Some(snapshot) => {
            let version = snapshot.version;
            let mut aggregate: A = snapshot.into_state()?;
            aggregate.set_version(version);
            aggregate
        }
        None => A::default(),
    };

    for envelope in events {
        let event: A::Event = envelope.decode()?;
        aggregate.apply(event);
        aggregate.set_version(envelope.version);
    }

    Ok(aggregate)
}

/// Wraps domain events in envelopes numbered after `current_version`.
pub fn build_envelopes<A: Aggregate>(
    aggregate_id: AggregateId,
    current_version: Version,
    events: &[A::Event],
) -> Result<Vec<EventEnvelope>, DomainError> {
    let mut envelopes = Vec::with_capacity(events.len());
    let mut version = current_version;

    for event in events {
        version = version.next();
        let envelope = EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type(A::aggregate_type())
            .event_type(event.event_type())
            .version(version)
            .payload(event)?
            .build()?;
        envelopes.push(envelope);
    }

    Ok(envelopes)
}

/// Loads one aggregate, runs a command against it and appends the result
/// guarded by the version it was loaded at.
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate + DeserializeOwned,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate; a missing stream yields a default instance.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        rehydrate(&self.store, aggregate_id).await
    }

    /// Loads an aggregate, returning None if it was never created.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        Ok(aggregate.id().is_some().then_some(aggregate))
    }

    /// Executes a command and persists the resulting events.
    ///
    /// The command function receives the current state and returns the
    /// events to record, or an error. Returning no events persists nothing.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut aggregate = self.load(aggregate_id).await?;
        let current_version = aggregate.version();

        let events = command_fn(&aggregate)?;

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                new_version: current_version,
            });
        }

        let envelopes = build_envelopes::<A>(aggregate_id, current_version, &events)?;
        let new_version = self
            .store
            .append(envelopes, AppendOptions::expect_version(current_version))
            .await?;

        aggregate.apply_events(events.iter().cloned());
        aggregate.set_version(new_version);

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: SnapshotCapable,
{
    /// Executes a command and saves a snapshot when the new version lands on
    /// the aggregate's snapshot interval.
    pub async fn execute_with_snapshot<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let result = self.execute(aggregate_id, command_fn).await?;

        if !result.events.is_empty() && result.aggregate.should_snapshot() {
            let snapshot = Snapshot::from_state(
                aggregate_id,
                A::aggregate_type(),
                result.new_version,
                &result.aggregate,
            )?;
            self.store.save_snapshot(snapshot).await?;
            tracing::debug!(%aggregate_id, version = %result.new_version, "snapshot saved");
        }

        Ok(result)
    }
}

impl<S, A> Clone for CommandHandler<S, A>
where
    S: EventStore + Clone,
    A: Aggregate,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _phantom: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_store::{EventStoreError, InMemoryEventStore};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum TallyEvent {
        Opened { id: AggregateId, label: String },
        Added { amount: i32 },
    }

    impl DomainEvent for TallyEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TallyEvent::Opened { .. } => "TallyOpened",
                TallyEvent::Added { .. } => "TallyAdded",
            }
        }
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct Tally {
        id: Option<AggregateId>,
        label: String,
        total: i32,
        #[serde(skip)]
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("negative amount: {0}")]
    struct NegativeAmount(i32);

    impl Aggregate for Tally {
        type Event = TallyEvent;
        type Error = NegativeAmount;

        fn aggregate_type() -> &'static str {
            "Tally"
        }

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                TallyEvent::Opened { id, label } => {
                    self.id = Some(id);
                    self.label = label;
                }
                TallyEvent::Added { amount } => self.total += amount,
            }
        }
    }

    impl SnapshotCapable for Tally {
        fn snapshot_interval() -> usize {
            3
        }
    }

    impl From<NegativeAmount> for DomainError {
        fn from(e: NegativeAmount) -> Self {
            DomainError::AggregateNotFound {
                aggregate_type: "Tally",
                aggregate_id: e.to_string(),
            }
        }
    }

    fn add(amount: i32) -> impl FnOnce(&Tally) -> Result<Vec<TallyEvent>, NegativeAmount> {
        move |_| {
            if amount < 0 {
                Err(NegativeAmount(amount))
            } else {
                Ok(vec![TallyEvent::Added { amount }])
            }
        }
    }

    async fn open(handler: &CommandHandler<InMemoryEventStore, Tally>) -> AggregateId {
        let id = AggregateId::new();
        handler
            .execute(id, |_| {
                Ok(vec![TallyEvent::Opened {
                    id,
                    label: "visits".to_string(),
                }])
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn execute_persists_and_applies_events() {
        let handler: CommandHandler<_, Tally> = CommandHandler::new(InMemoryEventStore::new());
        let id = open(&handler).await;

        let result = handler.execute(id, add(4)).await.unwrap();

        assert_eq!(result.new_version, Version::new(2));
        assert_eq!(result.aggregate.total, 4);
        assert_eq!(handler.load(id).await.unwrap().total, 4);
    }

    #[tokio::test]
    async fn rejected_command_persists_nothing() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Tally> = CommandHandler::new(store.clone());
        let id = open(&handler).await;

        assert!(handler.execute(id, add(-1)).await.is_err());
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn empty_event_list_is_a_no_op() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Tally> = CommandHandler::new(store.clone());

        let result = handler.execute(AggregateId::new(), |_| Ok(vec![])).await.unwrap();

        assert!(result.events.is_empty());
        assert_eq!(result.new_version, Version::initial());
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn load_existing_distinguishes_missing_streams() {
        let handler: CommandHandler<_, Tally> = CommandHandler::new(InMemoryEventStore::new());
        assert!(handler.load_existing(AggregateId::new()).await.unwrap().is_none());

        let id = open(&handler).await;
        assert_eq!(handler.load_existing(id).await.unwrap().unwrap().label, "visits");
    }

    #[tokio::test]
    async fn stale_version_surfaces_as_conflict() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Tally> = CommandHandler::new(store.clone());
        let id = open(&handler).await;

        // Another writer appends behind the handler's back between load and append.
        let stale = build_envelopes::<Tally>(id, Version::initial(), &[TallyEvent::Added { amount: 1 }])
            .unwrap();
        let result = store.append(stale, AppendOptions::expect_new()).await;

        assert!(matches!(result, Err(EventStoreError::ConcurrencyConflict { .. })));
    }

    #[tokio::test]
    async fn snapshot_is_taken_on_interval_and_used_on_load() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Tally> = CommandHandler::new(store.clone());
        let id = open(&handler).await;

        handler.execute_with_snapshot(id, add(1)).await.unwrap();
        assert!(store.get_snapshot(id).await.unwrap().is_none());

        handler.execute_with_snapshot(id, add(2)).await.unwrap();
        let snapshot = store.get_snapshot(id).await.unwrap().unwrap();
        assert_eq!(snapshot.version, Version::new(3));

        handler.execute_with_snapshot(id, add(5)).await.unwrap();
        let loaded = handler.load(id).await.unwrap();
        assert_eq!(loaded.total, 8);
        assert_eq!(loaded.version(), Version::new(4));
    }
}

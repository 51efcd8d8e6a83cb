use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AggregateId, EventStoreError};

/// Identity of a single stored event, independent of its stream position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Position of an event within its stream.
///
/// A stream that has never been written sits at version 0; its first event
/// is version 1. Appends carry the version they expect the stream to be at,
/// which is how two checkouts racing for the same product are told apart.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Version of a stream with no events.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Version carried by a stream's first event.
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// True when no event has been written at this version yet.
    pub fn is_initial(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A stored event: the domain payload plus the stream coordinates it was
/// appended at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,

    /// Tag of the domain event, e.g. "ItemAdded" or "PaymentSucceeded".
    pub event_type: String,

    pub aggregate_id: AggregateId,

    /// Stream family, e.g. "Cart", "Order" or "Product".
    pub aggregate_type: String,

    /// Stream version after this event was applied.
    pub version: Version,

    /// Global position assigned by the store when the event was appended.
    /// Positions increase in commit order across all streams; 0 means the
    /// envelope has not been stored yet.
    #[serde(default)]
    pub position: u64,

    pub timestamp: DateTime<Utc>,

    /// Serialized domain event.
    pub payload: serde_json::Value,

    /// Free-form annotations that are not part of the domain event.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }

    /// True when this event was written to a stream of `aggregate_type`.
    pub fn belongs_to(&self, aggregate_type: &str) -> bool {
        self.aggregate_type == aggregate_type
    }

    /// Deserializes the payload back into its domain event.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Assembles an [`EventEnvelope`]. The event id and timestamp are filled
/// in on [`build`](Self::build) when not given.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    event_id: Option<EventId>,
    event_type: Option<String>,
    aggregate_id: Option<AggregateId>,
    aggregate_type: Option<String>,
    version: Option<Version>,
    position: u64,
    timestamp: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelopeBuilder {
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn position(mut self, position: u64) -> Self {
        self.position = position;
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Serializes `payload` as the event body.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Fails with [`EventStoreError::InvalidAppend`] naming the first
    /// missing field.
    pub fn build(self) -> Result<EventEnvelope, EventStoreError> {
        fn require<T>(value: Option<T>, field: &str) -> Result<T, EventStoreError> {
            value.ok_or_else(|| EventStoreError::InvalidAppend(format!("{field} is required")))
        }

        Ok(EventEnvelope {
            event_id: self.event_id.unwrap_or_default(),
            event_type: require(self.event_type, "event_type")?,
            aggregate_id: require(self.aggregate_id, "aggregate_id")?,
            aggregate_type: require(self.aggregate_type, "aggregate_type")?,
            version: require(self.version, "version")?,
            position: self.position,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            payload: require(self.payload, "payload")?,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct ItemAdded {
        sku: String,
        quantity: u32,
    }

    fn item_added(cart_id: AggregateId) -> EventEnvelope {
        EventEnvelope::builder()
            .event_type("ItemAdded")
            .aggregate_id(cart_id)
            .aggregate_type("Cart")
            .version(Version::first())
            .payload(&ItemAdded {
                sku: "tote-natural".into(),
                quantity: 2,
            })
            .unwrap()
            .metadata("source", serde_json::json!("storefront"))
            .build()
            .unwrap()
    }

    #[test]
    fn fresh_stream_starts_before_first_event() {
        assert!(Version::initial().is_initial());
        assert_eq!(Version::initial().next(), Version::first());
        assert!(Version::first() < Version::new(2));
        assert_eq!(Version::new(7).to_string(), "v7");
    }

    #[test]
    fn built_envelope_keeps_stream_coordinates() {
        let cart_id = AggregateId::new();
        let envelope = item_added(cart_id);

        assert_eq!(envelope.aggregate_id, cart_id);
        assert_eq!(envelope.version, Version::first());
        assert_eq!(envelope.position, 0);
        assert!(envelope.belongs_to("Cart"));
        assert!(!envelope.belongs_to("Order"));
        assert_eq!(envelope.metadata["source"], "storefront");
    }

    #[test]
    fn payload_decodes_into_domain_event() {
        let envelope = item_added(AggregateId::new());
        let event: ItemAdded = envelope.decode().unwrap();
        assert_eq!(
            event,
            ItemAdded {
                sku: "tote-natural".into(),
                quantity: 2
            }
        );
    }

    #[test]
    fn build_names_the_missing_field() {
        let result = EventEnvelope::builder()
            .event_type("ItemAdded")
            .aggregate_id(AggregateId::new())
            .version(Version::first())
            .payload_raw(serde_json::json!({}))
            .build();

        match result {
            Err(EventStoreError::InvalidAppend(msg)) => assert!(msg.contains("aggregate_type")),
            other => panic!("expected InvalidAppend, got {other:?}"),
        }
    }
}

//! Product domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::values::{Money, ProductId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProductEvent {
    ProductRegistered(ProductRegisteredData),
    PriceChanged(PriceChangedData),
    /// Stock taken by a checkout.
    StockDecremented(StockDecrementedData),
    /// Stock returned by a failed/refunded order or added by a restock.
    StockIncremented(StockIncrementedData),
}

impl DomainEvent for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductRegistered(_) => "ProductRegistered",
            ProductEvent::PriceChanged(_) => "PriceChanged",
            ProductEvent::StockDecremented(_) => "StockDecremented",
            ProductEvent::StockIncremented(_) => "StockIncremented",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRegisteredData {
    pub product_id: ProductId,
    pub title: String,
    pub price: Money,
    pub stock: u32,
    pub thumbnail: Option<String>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceChangedData {
    pub old_price: Money,
    pub new_price: Money,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockDecrementedData {
    pub quantity: u32,
    /// The order that took the stock, if any.
    pub order_id: Option<AggregateId>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestockReason {
    Manual,
    PaymentFailed,
    CheckoutAbandoned,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockIncrementedData {
    pub quantity: u32,
    pub order_id: Option<AggregateId>,
    pub reason: RestockReason,
    pub at: DateTime<Utc>,
}

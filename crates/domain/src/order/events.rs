//! Order domain events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::values::Money;

use super::{OrderLine, OrderStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Cart snapshot frozen into an order awaiting payment.
    OrderPlaced(OrderPlacedData),
    PaymentSessionOpened(PaymentSessionOpenedData),
    PaymentSucceeded(PaymentSucceededData),
    PaymentFailed(PaymentFailedData),
    OrderRefunded(OrderRefundedData),
    FulfillmentAdvanced(FulfillmentAdvancedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::PaymentSessionOpened(_) => "PaymentSessionOpened",
            OrderEvent::PaymentSucceeded(_) => "PaymentSucceeded",
            OrderEvent::PaymentFailed(_) => "PaymentFailed",
            OrderEvent::OrderRefunded(_) => "OrderRefunded",
            OrderEvent::FulfillmentAdvanced(_) => "FulfillmentAdvanced",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub owner: UserId,
    pub lines: Vec<OrderLine>,
    pub sub_total: Money,
    pub gateway: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSessionOpenedData {
    pub gateway: String,
    pub session_id: String,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSucceededData {
    pub transaction_id: String,
    pub raw: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedData {
    pub reason: String,
    pub raw: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRefundedData {
    pub refund_id: Option<String>,
    /// None for a full refund.
    pub amount: Option<Money>,
    pub raw: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentAdvancedData {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
}

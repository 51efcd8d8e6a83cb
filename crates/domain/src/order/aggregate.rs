//! Order aggregate implementation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::values::{Money, ProductId};

use super::{
    FulfillmentAdvancedData, OrderError, OrderEvent, OrderLine, OrderPlacedData,
    OrderRefundedData, OrderStatus, PaymentFailedData, PaymentRecord, PaymentSessionOpenedData,
    PaymentStatus, PaymentSucceededData,
};

/// Order aggregate root.
///
/// Lines and sub-total are written once by `OrderPlaced` and never change.
/// Every later event only moves `status` and `payment.status` forward.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,
    #[serde(default)]
    version: Version,
    owner: Option<UserId>,
    lines: Vec<OrderLine>,
    sub_total: Money,
    status: OrderStatus,
    payment: PaymentRecord,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
    placed_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
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
            OrderEvent::OrderPlaced(data) => {
                self.id = Some(data.order_id);
                self.owner = Some(data.owner);
                self.lines = data.lines;
                self.sub_total = data.sub_total;
                self.status = OrderStatus::Created;
                self.payment = PaymentRecord {
                    gateway: data.gateway,
                    ..PaymentRecord::default()
                };
                self.metadata = data.metadata;
                self.placed_at = Some(data.placed_at);
            }
            OrderEvent::PaymentSessionOpened(data) => {
                self.payment.gateway = Some(data.gateway);
                self.payment.session_id = Some(data.session_id);
            }
            OrderEvent::PaymentSucceeded(data) => {
                self.status = OrderStatus::Processing;
                self.payment.status = PaymentStatus::Paid;
                self.payment.transaction_id = Some(data.transaction_id);
                self.payment.raw = data.raw;
            }
            OrderEvent::PaymentFailed(data) => {
                self.status = OrderStatus::Cancelled;
                self.payment.status = PaymentStatus::Failed;
                self.payment.raw = data.raw;
            }
            OrderEvent::OrderRefunded(data) => {
                self.status = OrderStatus::Refunded;
                self.payment.status = PaymentStatus::Refunded;
                self.payment.refund_id = data.refund_id;
                self.payment.refunded_amount = data.amount;
                if data.raw.is_some() {
                    self.payment.raw = data.raw;
                }
            }
            OrderEvent::FulfillmentAdvanced(data) => self.status = data.status,
        }
    }
}

// Query methods
impl Order {
    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn sub_total(&self) -> Money {
        self.sub_total
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment(&self) -> &PaymentRecord {
        &self.payment
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment.status
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == Some(user)
    }

    /// Total quantity per product across all lines.
    pub fn quantities_by_product(&self) -> BTreeMap<ProductId, u32> {
        let mut totals = BTreeMap::new();
        for line in &self.lines {
            let total = totals.entry(line.product_id).or_insert(0u32);
            *total = total.saturating_add(line.quantity);
        }
        totals
    }

    fn awaiting_payment(&self) -> bool {
        self.status.awaits_payment() && self.payment.status == PaymentStatus::Pending
    }

    fn invalid(&self, action: &'static str) -> OrderError {
        OrderError::InvalidStateTransition {
            status: self.status,
            payment_status: self.payment.status,
            action,
        }
    }

    fn require_placed(&self) -> Result<(), OrderError> {
        self.id.map(|_| ()).ok_or(OrderError::NotPlaced)
    }
}

// Command methods (return events). An empty event list means the command
// was already applied.
impl Order {
    pub fn place(
        &self,
        order_id: AggregateId,
        owner: UserId,
        lines: Vec<OrderLine>,
        gateway: Option<String>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyPlaced);
        }
        if lines.is_empty() {
            return Err(OrderError::NoItems);
        }
        if let Some(line) = lines.iter().find(|l| l.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id,
            });
        }

        let sub_total = Money::checked_total(lines.iter().map(|l| (l.price, l.quantity)))
            .ok_or(OrderError::AmountTooLarge)?;
        Ok(vec![OrderEvent::OrderPlaced(OrderPlacedData {
            order_id,
            owner,
            lines,
            sub_total,
            gateway,
            metadata,
            placed_at: Utc::now(),
        })])
    }

    pub fn open_payment_session(
        &self,
        gateway: &str,
        session_id: &str,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        if self.payment.session_id.as_deref() == Some(session_id) {
            return Ok(vec![]);
        }
        if !self.awaiting_payment() {
            return Err(self.invalid("open a payment session"));
        }

        Ok(vec![OrderEvent::PaymentSessionOpened(PaymentSessionOpenedData {
            gateway: gateway.to_string(),
            session_id: session_id.to_string(),
            opened_at: Utc::now(),
        })])
    }

    /// `(created, pending)` to `(processing, paid)`.
    pub fn confirm_payment(
        &self,
        transaction_id: &str,
        raw: Option<serde_json::Value>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        if matches!(self.payment.status, PaymentStatus::Paid | PaymentStatus::Refunded) {
            return Ok(vec![]);
        }
        if !self.awaiting_payment() {
            return Err(self.invalid("confirm payment"));
        }

        Ok(vec![OrderEvent::PaymentSucceeded(PaymentSucceededData {
            transaction_id: transaction_id.to_string(),
            raw,
            at: Utc::now(),
        })])
    }

    /// `(created, pending)` to `(cancelled, failed)`.
    pub fn fail_payment(
        &self,
        reason: &str,
        raw: Option<serde_json::Value>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        if self.payment.status == PaymentStatus::Failed {
            return Ok(vec![]);
        }
        if !self.awaiting_payment() {
            return Err(self.invalid("fail payment"));
        }

        Ok(vec![OrderEvent::PaymentFailed(PaymentFailedData {
            reason: reason.to_string(),
            raw,
            at: Utc::now(),
        })])
    }

    /// `(*, paid)` to `(refunded, refunded)`.
    pub fn refund(
        &self,
        refund_id: Option<String>,
        amount: Option<Money>,
        raw: Option<serde_json::Value>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        if self.payment.status == PaymentStatus::Refunded {
            return Ok(vec![]);
        }
        if !self.payment.status.can_refund() {
            return Err(self.invalid("refund"));
        }

        Ok(vec![OrderEvent::OrderRefunded(OrderRefundedData {
            refund_id,
            amount,
            raw,
            at: Utc::now(),
        })])
    }

    /// `processing` to `shipped` to `delivered`.
    pub fn advance_fulfillment(&self, target: OrderStatus) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        if self.status == target {
            return Ok(vec![]);
        }

        let allowed = match target {
            OrderStatus::Shipped => self.status.can_ship(),
            OrderStatus::Delivered => self.status.can_deliver(),
            other => return Err(OrderError::InvalidFulfillmentTarget(other)),
        };
        if !allowed {
            return Err(self.invalid("advance fulfillment"));
        }

        Ok(vec![OrderEvent::FulfillmentAdvanced(FulfillmentAdvancedData {
            status: target,
            at: Utc::now(),
        })])
    }
}

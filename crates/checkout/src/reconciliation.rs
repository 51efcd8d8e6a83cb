//! Payment reconciliation state machine.
//!
//! Moves an order's `(status, payment status)` pair in response to gateway
//! outcomes and compensates inventory:
//!
//! | outcome | from | to | stock |
//! |---|---|---|---|
//! | success | `(created, pending)` | `(processing, paid)` | none, checkout already decremented |
//! | failure | `(created, pending)` | `(cancelled, failed)` | restored |
//! | refund | `(*, paid)` | `(refunded, refunded)` | restored in full |
//!
//! Each transition is one unit of work over the order and its products, so
//! replaying an event can never restock twice: the second run finds the
//! order already moved and reports [`Transition::Duplicate`].

use std::future::Future;
use std::sync::Arc;

use common::{AggregateId, UserId};
use domain::{
    Aggregate, Cart, CartItem, CartItemId, DomainError, Money, Order, OrderError, OrderEvent,
    Product, RestockReason, UnitOfWork,
};
use event_store::EventStore;
use projections::{OrderLookupView, ProjectionProcessor};
use serde::Serialize;
use serde_json::Value;

use crate::error::{CheckoutError, Result};
use crate::gateway::SessionPaymentStatus;
use crate::webhook::GatewayEvent;

/// Attempts per transition when a concurrent write moves one of its streams.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Applied,
    /// The order was already in the target state.
    Duplicate,
    /// Not valid from the order's current state, or not addressed to a
    /// known order.
    Ignored,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Applied => "applied",
            Transition::Duplicate => "duplicate",
            Transition::Ignored => "ignored",
        }
    }
}

#[derive(Debug, Clone)]
enum Settlement {
    Confirm {
        transaction_id: String,
        raw: Option<Value>,
    },
    Fail {
        reason: String,
        raw: Option<Value>,
        restock: RestockReason,
        restore_cart: bool,
    },
    Refund {
        refund_id: Option<String>,
        amount: Option<Money>,
        raw: Option<Value>,
    },
}

impl Settlement {
    fn decide(&self, order: &Order) -> std::result::Result<Vec<OrderEvent>, OrderError> {
        match self {
            Settlement::Confirm {
                transaction_id,
                raw,
            } => order.confirm_payment(transaction_id, raw.clone()),
            Settlement::Fail { reason, raw, .. } => order.fail_payment(reason, raw.clone()),
            Settlement::Refund {
                refund_id,
                amount,
                raw,
            } => order.refund(refund_id.clone(), *amount, raw.clone()),
        }
    }

    fn restock(&self) -> Option<RestockReason> {
        match self {
            Settlement::Confirm { .. } => None,
            Settlement::Fail { restock, .. } => Some(*restock),
            Settlement::Refund { .. } => Some(RestockReason::Refunded),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Settlement::Confirm { .. } => "payment_succeeded",
            Settlement::Fail { .. } => "payment_failed",
            Settlement::Refund { .. } => "refunded",
        }
    }
}

pub struct PaymentReconciler<S: EventStore> {
    store: S,
    processor: Arc<ProjectionProcessor<S>>,
    lookup: OrderLookupView,
}

impl<S: EventStore> PaymentReconciler<S> {
    /// `lookup` must be registered with `processor`.
    pub fn new(store: S, processor: Arc<ProjectionProcessor<S>>, lookup: OrderLookupView) -> Self {
        Self {
            store,
            processor,
            lookup,
        }
    }

    /// Applies a verified gateway event.
    #[tracing::instrument(skip(self, event), fields(kind = event.kind()))]
    pub async fn apply(&self, event: GatewayEvent) -> Result<Transition> {
        let kind = event.kind();
        let outcome = match event {
            GatewayEvent::SessionCompleted {
                event_id,
                order_id,
                payment_status,
                transaction_id,
                raw,
                ..
            } => {
                if payment_status != SessionPaymentStatus::Paid {
                    tracing::info!(
                        %event_id,
                        %order_id,
                        %payment_status,
                        "session completed without payment"
                    );
                    Transition::Ignored
                } else if let Some(transaction_id) = transaction_id {
                    self.confirm_payment(order_id, &transaction_id, Some(raw))
                        .await?
                } else {
                    tracing::warn!(%event_id, %order_id, "paid session carries no transaction id");
                    Transition::Ignored
                }
            }
            GatewayEvent::PaymentFailed {
                event_id,
                transaction_id,
                order_id,
                reason,
                raw,
            } => match order_id {
                Some(order_id) => self.fail_payment(order_id, &reason, Some(raw)).await?,
                None => {
                    tracing::warn!(%event_id, %transaction_id, "payment failure names no order");
                    Transition::Ignored
                }
            },
            GatewayEvent::ChargeRefunded {
                event_id,
                transaction_id,
                refund_id,
                amount_refunded,
                raw,
            } => match self.order_for_transaction(&transaction_id).await? {
                Some(order_id) => {
                    self.record_refund(order_id, refund_id, amount_refunded, Some(raw))
                        .await?
                }
                None => {
                    tracing::warn!(%event_id, %transaction_id, "refund for unknown transaction");
                    Transition::Ignored
                }
            },
            GatewayEvent::Unhandled {
                event_id,
                event_type,
            } => {
                tracing::debug!(%event_id, %event_type, "ignoring unhandled gateway event");
                Transition::Ignored
            }
        };

        metrics::counter!(
            "payment_transitions_total",
            "event" => kind,
            "outcome" => outcome.as_str()
        )
        .increment(1);
        Ok(outcome)
    }

    /// `(created, pending)` to `(processing, paid)`. Stock is untouched.
    ///
    /// A transaction id already recorded on a different order is ignored.
    pub async fn confirm_payment(
        &self,
        order_id: AggregateId,
        transaction_id: &str,
        raw: Option<Value>,
    ) -> Result<Transition> {
        if let Some(other) = self.order_for_transaction(transaction_id).await?
            && other != order_id
        {
            tracing::warn!(
                %order_id,
                %other,
                %transaction_id,
                "transaction already belongs to another order"
            );
            return Ok(Transition::Ignored);
        }

        self.settle(
            order_id,
            Settlement::Confirm {
                transaction_id: transaction_id.to_string(),
                raw,
            },
        )
        .await
    }

    /// `(created, pending)` to `(cancelled, failed)`, restoring stock.
    pub async fn fail_payment(
        &self,
        order_id: AggregateId,
        reason: &str,
        raw: Option<Value>,
    ) -> Result<Transition> {
        self.settle(
            order_id,
            Settlement::Fail {
                reason: reason.to_string(),
                raw,
                restock: RestockReason::PaymentFailed,
                restore_cart: false,
            },
        )
        .await
    }

    /// Like [`fail_payment`](Self::fail_payment), and also puts the order's
    /// lines back into the owner's cart. Used when no payable session could
    /// be opened for a freshly placed order.
    pub async fn abandon_checkout(&self, order_id: AggregateId, reason: &str) -> Result<Transition> {
        self.settle(
            order_id,
            Settlement::Fail {
                reason: reason.to_string(),
                raw: None,
                restock: RestockReason::CheckoutAbandoned,
                restore_cart: true,
            },
        )
        .await
    }

    /// `(*, paid)` to `(refunded, refunded)`, restoring the full ordered
    /// quantities whatever the refunded amount.
    pub async fn record_refund(
        &self,
        order_id: AggregateId,
        refund_id: Option<String>,
        amount: Option<Money>,
        raw: Option<Value>,
    ) -> Result<Transition> {
        self.settle(
            order_id,
            Settlement::Refund {
                refund_id,
                amount,
                raw,
            },
        )
        .await
    }

    async fn order_for_transaction(&self, transaction_id: &str) -> Result<Option<AggregateId>> {
        self.processor.run_catch_up().await?;
        Ok(self.lookup.order_for_transaction(transaction_id).await)
    }

    async fn settle(&self, order_id: AggregateId, settlement: Settlement) -> Result<Transition> {
        let label = settlement.label();
        let settlement = &settlement;
        let transition = retry_on_conflict(move || self.try_settle(order_id, settlement)).await?;
        tracing::info!(
            %order_id,
            settlement = label,
            outcome = transition.as_str(),
            "payment transition"
        );
        Ok(transition)
    }

    async fn try_settle(&self, order_id: AggregateId, settlement: &Settlement) -> Result<Transition> {
        let mut uow = UnitOfWork::new(&self.store);
        let mut order: Order = uow.load(order_id).await?;
        if order.id().is_none() {
            return Err(CheckoutError::not_found("Order", order_id));
        }

        let events = match settlement.decide(&order) {
            Ok(events) if events.is_empty() => return Ok(Transition::Duplicate),
            Ok(events) => events,
            Err(e @ OrderError::InvalidStateTransition { .. }) => {
                tracing::warn!(%order_id, error = %e, "transition not valid from current state");
                return Ok(Transition::Ignored);
            }
            Err(e) => return Err(DomainError::from(e).into()),
        };
        uow.record(order_id, &mut order, events)?;

        if let Some(reason) = settlement.restock() {
            for (product_id, quantity) in order.quantities_by_product() {
                let mut product: Product = uow.load(product_id.into()).await?;
                let restocked = product.increment_stock(quantity, Some(order_id), reason)?;
                uow.record(product_id.into(), &mut product, restocked)?;
            }
        }

        if let Settlement::Fail {
            restore_cart: true, ..
        } = settlement
            && let Some(owner) = order.owner()
        {
            self.restore_cart(&mut uow, owner, order_id, &order).await?;
        }

        uow.commit().await?;
        Ok(Transition::Applied)
    }

    async fn restore_cart(
        &self,
        uow: &mut UnitOfWork<'_, S>,
        owner: UserId,
        order_id: AggregateId,
        order: &Order,
    ) -> Result<()> {
        let mut items = Vec::with_capacity(order.lines().len());
        for line in order.lines() {
            let product: Product = uow.load(line.product_id.into()).await?;
            items.push(CartItem {
                item_id: CartItemId::new(),
                product_id: line.product_id,
                quantity: line.quantity,
                price: line.price,
                title: line.title.clone(),
                thumbnail: product.thumbnail().map(str::to_string),
                selected_options: line.selected_options.clone(),
            });
        }

        let cart_id = owner.cart_id();
        let mut cart: Cart = uow.load(cart_id).await?;
        let restored = cart.restore_items(cart_id, owner, order_id, items)?;
        uow.record(cart_id, &mut cart, restored)?;
        Ok(())
    }
}

/// Runs `op` until it succeeds, fails for a reason other than a version
/// conflict, or [`MAX_ATTEMPTS`] is reached.
async fn retry_on_conflict<F, Fut, T>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retryable_conflict() && attempt < MAX_ATTEMPTS => {
                tracing::debug!(attempt, error = %e, "retrying after version conflict");
                attempt += 1;
            }
            other => return other,
        }
    }
}

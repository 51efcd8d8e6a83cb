//! Customer orders read model: per-owner order listings and spend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AggregateId, UserId};
use domain::{Money, OrderEvent};
use event_store::EventEnvelope;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition, ReadModel};

/// Orders placed by one customer, oldest first.
#[derive(Debug, Clone)]
pub struct CustomerOrdersSummary {
    pub owner: UserId,
    pub order_ids: Vec<AggregateId>,
    pub paid_orders: u64,
    /// Sub-totals of orders that are paid and not refunded.
    pub total_spent: Money,
}

impl CustomerOrdersSummary {
    fn new(owner: UserId) -> Self {
        Self {
            owner,
            order_ids: Vec::new(),
            paid_orders: 0,
            total_spent: Money::zero(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PlacedOrder {
    owner: UserId,
    sub_total: Money,
    paid: bool,
}

struct CustomerOrdersState {
    customers: HashMap<UserId, CustomerOrdersSummary>,
    orders: HashMap<AggregateId, PlacedOrder>,
    /// Every order id in placement order.
    all: Vec<AggregateId>,
    position: ProjectionPosition,
}

/// Read model view listing each customer's orders.
#[derive(Clone)]
pub struct CustomerOrdersView {
    state: Arc<RwLock<CustomerOrdersState>>,
}

impl CustomerOrdersView {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(CustomerOrdersState {
                customers: HashMap::new(),
                orders: HashMap::new(),
                all: Vec::new(),
                position: ProjectionPosition::zero(),
            })),
        }
    }

    pub async fn get_customer(&self, owner: UserId) -> Option<CustomerOrdersSummary> {
        self.state.read().await.customers.get(&owner).cloned()
    }

    /// Order ids placed by `owner`, oldest first. Empty for unknown owners.
    pub async fn orders_for(&self, owner: UserId) -> Vec<AggregateId> {
        self.state
            .read()
            .await
            .customers
            .get(&owner)
            .map(|c| c.order_ids.clone())
            .unwrap_or_default()
    }

    pub async fn all_orders(&self) -> Vec<AggregateId> {
        self.state.read().await.all.clone()
    }
}

impl Default for CustomerOrdersView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for CustomerOrdersView {
    fn name(&self) -> &'static str {
        "CustomerOrdersView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;

        if event.belongs_to("Order") {
            let order_id = event.aggregate_id;
            match event.decode::<OrderEvent>()? {
                OrderEvent::OrderPlaced(data) => {
                    if !state.orders.contains_key(&order_id) {
                        state.orders.insert(
                            order_id,
                            PlacedOrder {
                                owner: data.owner,
                                sub_total: data.sub_total,
                                paid: false,
                            },
                        );
                        state.all.push(order_id);
                        state
                            .customers
                            .entry(data.owner)
                            .or_insert_with(|| CustomerOrdersSummary::new(data.owner))
                            .order_ids
                            .push(order_id);
                    }
                }
                OrderEvent::PaymentSucceeded(_) => {
                    if let Some(order) = state.orders.get_mut(&order_id)
                        && !order.paid
                    {
                        order.paid = true;
                        let placed = *order;
                        if let Some(customer) = state.customers.get_mut(&placed.owner) {
                            customer.paid_orders += 1;
                            customer.total_spent += placed.sub_total;
                        }
                    }
                }
                OrderEvent::OrderRefunded(_) => {
                    if let Some(order) = state.orders.get_mut(&order_id)
                        && order.paid
                    {
                        order.paid = false;
                        let placed = *order;
                        if let Some(customer) = state.customers.get_mut(&placed.owner) {
                            customer.total_spent = Money::from_cents(
                                customer.total_spent.cents() - placed.sub_total.cents(),
                            );
                        }
                    }
                }
                OrderEvent::PaymentSessionOpened(_)
                | OrderEvent::PaymentFailed(_)
                | OrderEvent::FulfillmentAdvanced(_) => {}
            }
        }

        state.position = state.position.advance_to(event.position);
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.customers.clear();
        state.orders.clear();
        state.all.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for CustomerOrdersView {
    fn name(&self) -> &'static str {
        "CustomerOrdersView"
    }

    fn count(&self) -> usize {
        self.state
            .try_read()
            .map(|s| s.customers.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::test_support::{envelope, paid, placed};
    use chrono::Utc;
    use domain::order::OrderRefundedData;

    #[tokio::test]
    async fn placed_orders_are_listed_per_owner() {
        let view = CustomerOrdersView::new();
        let alice = UserId::new();
        let bob = UserId::new();
        let first = AggregateId::new();
        let second = AggregateId::new();
        let third = AggregateId::new();

        view.handle(&envelope(first, 1, &placed(first, alice, 1000)))
            .await
            .unwrap();
        view.handle(&envelope(second, 1, &placed(second, bob, 500)))
            .await
            .unwrap();
        view.handle(&envelope(third, 1, &placed(third, alice, 700)))
            .await
            .unwrap();

        assert_eq!(view.orders_for(alice).await, vec![first, third]);
        assert_eq!(view.orders_for(bob).await, vec![second]);
        assert_eq!(view.all_orders().await, vec![first, second, third]);
        assert!(view.orders_for(UserId::new()).await.is_empty());
    }

    #[tokio::test]
    async fn replayed_placement_is_listed_once() {
        let view = CustomerOrdersView::new();
        let owner = UserId::new();
        let order_id = AggregateId::new();
        let event = envelope(order_id, 1, &placed(order_id, owner, 1000));

        view.handle(&event).await.unwrap();
        view.handle(&event).await.unwrap();

        assert_eq!(view.orders_for(owner).await, vec![order_id]);
    }

    #[tokio::test]
    async fn spend_follows_payment_and_refund() {
        let view = CustomerOrdersView::new();
        let owner = UserId::new();
        let order_id = AggregateId::new();

        view.handle(&envelope(order_id, 1, &placed(order_id, owner, 2500)))
            .await
            .unwrap();
        view.handle(&envelope(order_id, 2, &paid("pi_1")))
            .await
            .unwrap();
        view.handle(&envelope(order_id, 3, &paid("pi_1")))
            .await
            .unwrap();

        let summary = view.get_customer(owner).await.unwrap();
        assert_eq!(summary.paid_orders, 1);
        assert_eq!(summary.total_spent, Money::from_cents(2500));

        let refunded = OrderEvent::OrderRefunded(OrderRefundedData {
            refund_id: Some("re_1".to_string()),
            amount: None,
            raw: None,
            at: Utc::now(),
        });
        view.handle(&envelope(order_id, 4, &refunded)).await.unwrap();

        let summary = view.get_customer(owner).await.unwrap();
        assert_eq!(summary.total_spent, Money::zero());
    }

    #[tokio::test]
    async fn reset_forgets_everything() {
        let view = CustomerOrdersView::new();
        let owner = UserId::new();
        let order_id = AggregateId::new();
        view.handle(&envelope(order_id, 1, &placed(order_id, owner, 100)))
            .await
            .unwrap();

        view.reset().await.unwrap();

        assert!(view.get_customer(owner).await.is_none());
        assert!(view.all_orders().await.is_empty());
        assert_eq!(view.position().await.last_position, 0);
    }
}

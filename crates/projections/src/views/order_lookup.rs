//! Join-key index from gateway references to orders.
//!
//! Inbound gateway events identify an order either by the checkout session
//! they were raised for or by the transaction (payment intent) id. This view
//! resolves both back to the order stream.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use domain::OrderEvent;
use event_store::EventEnvelope;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition, ReadModel};

struct OrderLookupState {
    by_session: HashMap<String, AggregateId>,
    by_transaction: HashMap<String, AggregateId>,
    position: ProjectionPosition,
}

#[derive(Clone)]
pub struct OrderLookupView {
    state: Arc<RwLock<OrderLookupState>>,
}

impl OrderLookupView {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(OrderLookupState {
                by_session: HashMap::new(),
                by_transaction: HashMap::new(),
                position: ProjectionPosition::zero(),
            })),
        }
    }

    pub async fn order_for_session(&self, session_id: &str) -> Option<AggregateId> {
        self.state.read().await.by_session.get(session_id).copied()
    }

    /// The order that first recorded this transaction id as its payment.
    pub async fn order_for_transaction(&self, transaction_id: &str) -> Option<AggregateId> {
        self.state
            .read()
            .await
            .by_transaction
            .get(transaction_id)
            .copied()
    }
}

impl Default for OrderLookupView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for OrderLookupView {
    fn name(&self) -> &'static str {
        "OrderLookupView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;

        if event.belongs_to("Order") {
            let order_id = event.aggregate_id;
            match event.decode::<OrderEvent>()? {
                OrderEvent::PaymentSessionOpened(data) => {
                    state.by_session.insert(data.session_id, order_id);
                }
                OrderEvent::PaymentSucceeded(data) => {
                    // First writer keeps the key.
                    state
                        .by_transaction
                        .entry(data.transaction_id)
                        .or_insert(order_id);
                }
                OrderEvent::OrderPlaced(_)
                | OrderEvent::PaymentFailed(_)
                | OrderEvent::OrderRefunded(_)
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
        state.by_session.clear();
        state.by_transaction.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for OrderLookupView {
    fn name(&self) -> &'static str {
        "OrderLookupView"
    }

    fn count(&self) -> usize {
        self.state
            .try_read()
            .map(|s| s.by_session.len() + s.by_transaction.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::test_support::{envelope, paid, placed, session_opened};
    use common::UserId;

    #[tokio::test]
    async fn resolves_sessions_and_transactions() {
        let view = OrderLookupView::new();
        let order_id = AggregateId::new();

        view.handle(&envelope(order_id, 1, &placed(order_id, UserId::new(), 500)))
            .await
            .unwrap();
        view.handle(&envelope(order_id, 2, &session_opened("cs_1")))
            .await
            .unwrap();
        view.handle(&envelope(order_id, 3, &paid("pi_1")))
            .await
            .unwrap();

        assert_eq!(view.order_for_session("cs_1").await, Some(order_id));
        assert_eq!(view.order_for_transaction("pi_1").await, Some(order_id));
        assert_eq!(view.order_for_transaction("pi_other").await, None);
        assert_eq!(view.position().await.last_position, 3);
    }

    #[tokio::test]
    async fn transaction_key_stays_with_the_first_order() {
        let view = OrderLookupView::new();
        let first = AggregateId::new();
        let second = AggregateId::new();

        view.handle(&envelope(first, 3, &paid("pi_shared")))
            .await
            .unwrap();
        view.handle(&envelope(second, 3, &paid("pi_shared")))
            .await
            .unwrap();

        assert_eq!(view.order_for_transaction("pi_shared").await, Some(first));
    }

    #[tokio::test]
    async fn non_order_events_only_advance_position() {
        let view = OrderLookupView::new();
        let event = EventEnvelope::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type("Cart")
            .event_type("CartCleared")
            .version(event_store::Version::new(1))
            .position(1)
            .payload_raw(serde_json::json!({"anything": true}))
            .build()
            .unwrap();

        view.handle(&event).await.unwrap();

        assert_eq!(view.position().await.last_position, 1);
        assert_eq!(ReadModel::count(&view), 0);
    }

    #[tokio::test]
    async fn reset_clears_keys() {
        let view = OrderLookupView::new();
        let order_id = AggregateId::new();
        view.handle(&envelope(order_id, 2, &session_opened("cs_reset")))
            .await
            .unwrap();

        view.reset().await.unwrap();

        assert!(view.order_for_session("cs_reset").await.is_none());
        assert_eq!(view.position().await, ProjectionPosition::zero());
    }
}

//! Order service: reads and fulfillment.

use common::AggregateId;
use event_store::{EventEnvelope, EventStore};

use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;

use super::{Order, OrderStatus};

pub struct OrderService<S: EventStore> {
    handler: CommandHandler<S, Order>,
}

impl<S: EventStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn handler(&self) -> &CommandHandler<S, Order> {
        &self.handler
    }

    pub async fn find(&self, order_id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.handler.load_existing(order_id).await
    }

    pub async fn get(&self, order_id: AggregateId) -> Result<Order, DomainError> {
        self.find(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", order_id))
    }

    /// The order's full event history, oldest first.
    pub async fn history(&self, order_id: AggregateId) -> Result<Vec<EventEnvelope>, DomainError> {
        Ok(self
            .handler
            .store()
            .get_events_for_aggregate(order_id)
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn advance_fulfillment(
        &self,
        order_id: AggregateId,
        target: OrderStatus,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.get(order_id).await?;
        let result = self
            .handler
            .execute(order_id, |order| order.advance_fulfillment(target))
            .await?;

        if !result.events.is_empty() {
            metrics::counter!("orders_fulfillment_advanced_total", "status" => target.as_str())
                .increment(1);
            tracing::info!(%order_id, status = %target, "fulfillment advanced");
        }
        Ok(result)
    }
}

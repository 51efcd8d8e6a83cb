//! Inventory ledger: the product store the checkout and reconciliation
//! paths read from and write to.

use common::AggregateId;
use event_store::EventStore;

use crate::aggregate::Aggregate;
use crate::command::{Command, CommandHandler};
use crate::error::DomainError;
use crate::values::{Money, ProductId};

use super::{Product, ProductError, ProductEvent, RestockReason};

#[derive(Debug, Clone)]
pub struct RegisterProduct {
    pub product_id: ProductId,
    pub title: String,
    pub price: Money,
    pub stock: u32,
    pub thumbnail: Option<String>,
}

impl Command for RegisterProduct {
    type Aggregate = Product;

    fn aggregate_id(&self) -> AggregateId {
        self.product_id.into()
    }
}

pub struct InventoryLedger<S: EventStore> {
    handler: CommandHandler<S, Product>,
}

impl<S: EventStore> InventoryLedger<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn register_product(&self, cmd: RegisterProduct) -> Result<Product, DomainError> {
        let RegisterProduct {
            product_id,
            title,
            price,
            stock,
            thumbnail,
        } = cmd;

        let result = self
            .handler
            .execute(product_id.into(), |product| {
                product.register(product_id, title, price, stock, thumbnail)
            })
            .await?;
        Ok(result.aggregate)
    }

    pub async fn find_by_id(&self, product_id: ProductId) -> Result<Option<Product>, DomainError> {
        self.handler.load_existing(product_id.into()).await
    }

    pub async fn get(&self, product_id: ProductId) -> Result<Product, DomainError> {
        self.find_by_id(product_id)
            .await?
            .ok_or_else(|| ProductError::NotFound(product_id).into())
    }

    #[tracing::instrument(skip(self))]
    pub async fn change_price(
        &self,
        product_id: ProductId,
        price: Money,
    ) -> Result<Product, DomainError> {
        self.run(product_id, |product| product.change_price(price))
            .await
    }

    /// Takes stock only if the full quantity is available at the version
    /// read; a concurrent writer makes this fail with a version conflict.
    #[tracing::instrument(skip(self))]
    pub async fn conditional_decrement(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Product, DomainError> {
        self.run(product_id, |product| product.decrement_stock(quantity, None))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn increment(&self, product_id: ProductId, quantity: u32) -> Result<Product, DomainError> {
        self.run(product_id, |product| {
            product.increment_stock(quantity, None, RestockReason::Manual)
        })
        .await
    }

    async fn run<F>(&self, product_id: ProductId, command: F) -> Result<Product, DomainError>
    where
        F: FnOnce(&Product) -> Result<Vec<ProductEvent>, ProductError>,
    {
        let result = self
            .handler
            .execute(product_id.into(), |product| {
                if product.id().is_none() {
                    return Err(ProductError::NotFound(product_id));
                }
                command(product)
            })
            .await?;
        Ok(result.aggregate)
    }
}

//! Cart service.

use common::UserId;
use event_store::EventStore;

use crate::aggregate::Aggregate;
use crate::command::{Command, CommandHandler};
use crate::error::DomainError;
use crate::product::{Product, ProductError};

use super::{AddCartItem, Cart, CartError, RemoveCartItem, SetItemQuantity};

/// Cart operations for an authenticated owner. Every operation returns the
/// cart as it stands after the change.
pub struct CartService<S: EventStore> {
    carts: CommandHandler<S, Cart>,
    products: CommandHandler<S, Product>,
}

impl<S: EventStore + Clone> CartService<S> {
    pub fn new(store: S) -> Self {
        Self {
            carts: CommandHandler::new(store.clone()),
            products: CommandHandler::new(store),
        }
    }
}

impl<S: EventStore> CartService<S> {
    /// Returns the owner's cart, opening it on first access.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create(&self, owner: UserId) -> Result<Cart, DomainError> {
        if let Some(cart) = self.carts.load_existing(owner.cart_id()).await? {
            return Ok(cart);
        }

        let opened = self
            .carts
            .execute(owner.cart_id(), |cart| {
                if cart.id().is_some() {
                    Ok(vec![])
                } else {
                    cart.open(owner.cart_id(), owner)
                }
            })
            .await;

        match opened {
            Ok(result) => Ok(result.aggregate),
            // Lost the race to open it; the other writer's cart is ours too.
            Err(e) if e.is_concurrency_conflict() => self.carts.load(owner.cart_id()).await,
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_item(&self, cmd: AddCartItem) -> Result<Cart, DomainError> {
        if cmd.quantity <= 0 {
            return Err(CartError::InvalidQuantity {
                quantity: cmd.quantity,
            }
            .into());
        }

        let product = self
            .products
            .load_existing(cmd.product_id.into())
            .await?
            .ok_or(ProductError::NotFound(cmd.product_id))?;

        self.get_or_create(cmd.owner).await?;
        let result = self
            .carts
            .execute_with_snapshot(cmd.aggregate_id(), |cart| {
                cart.add_item(&product, cmd.quantity, cmd.selected_options.clone())
            })
            .await?;

        tracing::info!(
            owner = %cmd.owner,
            product_id = %cmd.product_id,
            sub_total = %result.aggregate.sub_total(),
            "item added to cart"
        );
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_item_quantity(&self, cmd: SetItemQuantity) -> Result<Cart, DomainError> {
        self.get_or_create(cmd.owner).await?;
        let result = self
            .carts
            .execute_with_snapshot(cmd.aggregate_id(), |cart| {
                cart.set_item_quantity(cmd.item_id, cmd.quantity)
            })
            .await?;
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, cmd: RemoveCartItem) -> Result<Cart, DomainError> {
        self.get_or_create(cmd.owner).await?;
        let result = self
            .carts
            .execute_with_snapshot(cmd.aggregate_id(), |cart| cart.remove_item(cmd.item_id))
            .await?;
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, owner: UserId) -> Result<Cart, DomainError> {
        self.get_or_create(owner).await?;
        let result = self
            .carts
            .execute_with_snapshot(owner.cart_id(), |cart| cart.clear())
            .await?;
        Ok(result.aggregate)
    }
}

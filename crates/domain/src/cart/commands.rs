//! Cart commands.

use common::{AggregateId, UserId};

use crate::command::Command;
use crate::values::{ProductId, SelectedOptions};

use super::{Cart, CartItemId};

/// Add a product to the owner's cart.
#[derive(Debug, Clone)]
pub struct AddCartItem {
    pub owner: UserId,
    pub product_id: ProductId,
    /// Must be positive; kept signed so invalid input reaches validation.
    pub quantity: i64,
    pub selected_options: SelectedOptions,
}

impl Command for AddCartItem {
    type Aggregate = Cart;

    fn aggregate_id(&self) -> AggregateId {
        self.owner.cart_id()
    }
}

/// Replace an item's quantity. Zero or less removes the item.
#[derive(Debug, Clone)]
pub struct SetItemQuantity {
    pub owner: UserId,
    pub item_id: CartItemId,
    pub quantity: i64,
}

impl Command for SetItemQuantity {
    type Aggregate = Cart;

    fn aggregate_id(&self) -> AggregateId {
        self.owner.cart_id()
    }
}

#[derive(Debug, Clone)]
pub struct RemoveCartItem {
    pub owner: UserId,
    pub item_id: CartItemId,
}

impl Command for RemoveCartItem {
    type Aggregate = Cart;

    fn aggregate_id(&self) -> AggregateId {
        self.owner.cart_id()
    }
}

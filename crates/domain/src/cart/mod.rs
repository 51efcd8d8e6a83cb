//! Shopping cart aggregate.

mod aggregate;
mod commands;
mod events;
mod service;

pub use aggregate::{Cart, CartItem, CartItemId};
pub use commands::{AddCartItem, RemoveCartItem, SetItemQuantity};
pub use events::{
    CartCheckedOutData, CartClearedData, CartEvent, CartOpenedData, ItemAddedData,
    ItemQuantityChangedData, ItemRemovedData, ItemsRestoredData,
};
pub use service::CartService;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CartError {
    #[error("Cart has not been opened")]
    NotOpened,

    #[error("Cart already opened")]
    AlreadyOpened,

    #[error("Invalid quantity: {quantity} (must be a positive integer)")]
    InvalidQuantity { quantity: i64 },

    #[error("Item not found: {0}")]
    ItemNotFound(CartItemId),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Product is not registered")]
    UnknownProduct,

    #[error("Cart total is too large")]
    AmountTooLarge,
}

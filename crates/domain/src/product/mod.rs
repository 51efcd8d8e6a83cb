//! Catalog products and their stock.

mod aggregate;
mod events;
mod ledger;

pub use aggregate::Product;
pub use events::{
    PriceChangedData, ProductEvent, ProductRegisteredData, RestockReason, StockDecrementedData,
    StockIncrementedData,
};
pub use ledger::{InventoryLedger, RegisterProduct};

use thiserror::Error;

use crate::values::ProductId;

#[derive(Debug, Error)]
pub enum ProductError {
    #[error("Product not found: {0}")]
    NotFound(ProductId),

    #[error("Product has not been registered")]
    NotRegistered,

    #[error("Product already registered")]
    AlreadyRegistered,

    #[error("Product title is required")]
    TitleRequired,

    #[error("Invalid price: {price} (must not be negative)")]
    InvalidPrice { price: i64 },

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },
}

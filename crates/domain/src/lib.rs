//! Domain layer for the storefront core.
//!
//! - [`product`]: catalog products and their stock ledger
//! - [`cart`]: per-user shopping carts
//! - [`order`]: immutable order snapshots with forward-only order/payment status
//! - [`unit_of_work`]: atomic commits spanning several aggregates

pub mod aggregate;
pub mod cart;
pub mod command;
pub mod error;
pub mod order;
pub mod product;
pub mod unit_of_work;
pub mod values;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use cart::{
    AddCartItem, Cart, CartError, CartEvent, CartItem, CartItemId, CartService, RemoveCartItem,
    SetItemQuantity,
};
pub use command::{Command, CommandHandler, CommandResult};
pub use error::DomainError;
pub use order::{
    Order, OrderError, OrderEvent, OrderLine, OrderService, OrderStatus, PaymentRecord,
    PaymentStatus,
};
pub use product::{
    InventoryLedger, Product, ProductError, ProductEvent, RegisterProduct, RestockReason,
};
pub use unit_of_work::UnitOfWork;
pub use values::{Money, ProductId, SelectedOptions};

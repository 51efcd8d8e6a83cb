//! Read model views over the order streams.

pub mod customer_orders;
pub mod order_lookup;

pub use customer_orders::{CustomerOrdersSummary, CustomerOrdersView};
pub use order_lookup::OrderLookupView;

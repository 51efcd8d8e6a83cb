//! Order aggregate: an immutable snapshot of a checked-out cart plus the
//! forward-only order and payment statuses.

mod aggregate;
mod events;
mod service;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use events::{
    FulfillmentAdvancedData, OrderEvent, OrderPlacedData, OrderRefundedData, PaymentFailedData,
    PaymentSessionOpenedData, PaymentSucceededData,
};
pub use service::OrderService;
pub use state::{OrderStatus, PaymentStatus};
pub use value_objects::{OrderLine, PaymentRecord};

use thiserror::Error;

use crate::values::ProductId;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order has not been placed")]
    NotPlaced,

    #[error("Order already placed")]
    AlreadyPlaced,

    #[error("Order has no items")]
    NoItems,

    #[error("Invalid quantity for {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId },

    /// The order's current (status, payment status) does not allow the action.
    #[error("Invalid state transition: cannot {action} from ({status}, {payment_status})")]
    InvalidStateTransition {
        status: OrderStatus,
        payment_status: PaymentStatus,
        action: &'static str,
    },

    #[error("{0} is not a fulfillment status")]
    InvalidFulfillmentTarget(OrderStatus),

    #[error("Order total is too large")]
    AmountTooLarge,
}

//! Order value objects.

use serde::{Deserialize, Serialize};

use crate::values::{Money, ProductId, SelectedOptions};

use super::PaymentStatus;

/// A frozen order line. Price is the product price at checkout time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
    pub title: String,
    #[serde(default)]
    pub selected_options: SelectedOptions,
}

impl OrderLine {
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// Payment side of an order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub status: PaymentStatus,
    pub gateway: Option<String>,
    /// Gateway checkout session the customer was sent to.
    pub session_id: Option<String>,
    /// Gateway transaction (payment intent) id; unique across orders.
    pub transaction_id: Option<String>,
    pub refund_id: Option<String>,
    pub refunded_amount: Option<Money>,
    /// Last gateway payload that moved this payment.
    pub raw: Option<serde_json::Value>,
}

//! Payment gateway adapter.
//!
//! The core only talks to the payment provider through [`PaymentGateway`].
//! It is constructed once and injected as `Arc<dyn PaymentGateway>`;
//! [`InMemoryGateway`] backs tests and local runs, [`StripeGateway`] talks to
//! the Stripe REST API.

mod memory;
mod stripe;

pub use memory::{InMemoryGateway, RecordedRefund};
pub use stripe::StripeGateway;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metadata key carrying the order id on sessions and payment intents.
pub const ORDER_ID_KEY: &str = "order_id";
/// Metadata key carrying the buyer's user id.
pub const USER_ID_KEY: &str = "user_id";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway request failed: {0}")]
    Transport(String),

    #[error("Gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Checkout session not found: {0}")]
    SessionNotFound(String),

    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),
}

/// One purchasable line shown on the hosted payment page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLineItem {
    pub name: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub unit_amount: Money,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub line_items: Vec<SessionLineItem>,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: BTreeMap<String, String>,
    pub customer_email: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// A session the buyer can be redirected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayableSession {
    pub session_id: String,
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
    #[serde(other)]
    Unknown,
}

impl SessionPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPaymentStatus::Paid => "paid",
            SessionPaymentStatus::Unpaid => "unpaid",
            SessionPaymentStatus::NoPaymentRequired => "no_payment_required",
            SessionPaymentStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SessionPaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Complete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Complete => "complete",
            SessionStatus::Expired => "expired",
            SessionStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live state of a checkout session as the gateway reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySession {
    pub session_id: String,
    pub payment_status: SessionPaymentStatus,
    pub status: SessionStatus,
    /// Transaction id once the buyer has paid.
    pub payment_intent: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundAmount {
    Full,
    Partial(Money),
}

impl RefundAmount {
    pub fn from_option(amount: Option<Money>) -> Self {
        amount.map_or(RefundAmount::Full, RefundAmount::Partial)
    }

    pub fn as_option(&self) -> Option<Money> {
        match self {
            RefundAmount::Full => None,
            RefundAmount::Partial(amount) => Some(*amount),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRefund {
    pub refund_id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Name recorded on orders paid through this gateway.
    fn name(&self) -> &'static str;

    async fn create_session(&self, request: SessionRequest)
    -> Result<PayableSession, GatewayError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<GatewaySession, GatewayError>;

    async fn create_refund(
        &self,
        transaction_id: &str,
        amount: RefundAmount,
    ) -> Result<GatewayRefund, GatewayError>;
}

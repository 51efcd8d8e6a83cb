//! Checkout and payment reconciliation.
//!
//! - [`CheckoutOrchestrator`] turns a cart into a pending order and reserves
//!   its stock in one atomic unit of work
//! - [`PaymentGateway`] is the only way out to the payment provider
//! - [`PaymentReconciler`] keeps order and payment status in step with
//!   gateway outcomes and compensates inventory
//! - [`PaymentService`] wires these together for hosted checkout sessions,
//!   verification, refunds and webhooks

pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod payment;
pub mod reconciliation;
pub mod webhook;

pub use error::{CheckoutError, Result};
pub use gateway::{
    GatewayError, GatewayRefund, GatewaySession, InMemoryGateway, PayableSession, PaymentGateway,
    RefundAmount, SessionLineItem, SessionPaymentStatus, SessionRequest, SessionStatus,
    StripeGateway,
};
pub use orchestrator::{CheckoutOrchestrator, CheckoutReceipt, CheckoutRequest};
pub use payment::{
    CheckoutSession, PaymentService, PaymentSettings, RefundReceipt, SessionVerification,
};
pub use reconciliation::{PaymentReconciler, Transition};
pub use webhook::{GatewayEvent, WebhookVerifier};

//! Payment application service: hosted checkout sessions, verification,
//! explicit refunds and the webhook entry point.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{AggregateId, Caller};
use domain::{InventoryLedger, Money, Order, OrderLine, OrderService, PaymentStatus};
use event_store::EventStore;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CheckoutError, Result};
use crate::gateway::{
    GatewayError, ORDER_ID_KEY, PaymentGateway, RefundAmount, SessionLineItem,
    SessionPaymentStatus, SessionRequest, SessionStatus, USER_ID_KEY,
};
use crate::orchestrator::{CheckoutOrchestrator, CheckoutRequest};
use crate::reconciliation::{PaymentReconciler, Transition};
use crate::webhook::{WebhookVerifier, parse_event};

/// Placeholder the gateway substitutes with the real session id.
const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub frontend_url: String,
    pub currency: String,
    pub session_ttl: Duration,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            currency: "usd".to_string(),
            session_ttl: Duration::minutes(30),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub order_id: AggregateId,
    pub session_id: String,
    pub redirect_url: Option<String>,
    pub sub_total: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionVerification {
    pub payment_status: SessionPaymentStatus,
    pub session_status: SessionStatus,
    pub order: Order,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundReceipt {
    pub order_id: AggregateId,
    pub refund_id: String,
    /// None for a full refund.
    pub amount: Option<Money>,
    pub transition: Transition,
}

pub struct PaymentService<S: EventStore> {
    orchestrator: CheckoutOrchestrator<S>,
    reconciler: Arc<PaymentReconciler<S>>,
    orders: OrderService<S>,
    products: InventoryLedger<S>,
    gateway: Arc<dyn PaymentGateway>,
    verifier: Option<WebhookVerifier>,
    settings: PaymentSettings,
}

impl<S: EventStore + Clone> PaymentService<S> {
    pub fn new(
        store: S,
        reconciler: Arc<PaymentReconciler<S>>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: Option<WebhookVerifier>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            orchestrator: CheckoutOrchestrator::new(store.clone()),
            orders: OrderService::new(store.clone()),
            products: InventoryLedger::new(store),
            reconciler,
            gateway,
            verifier,
            settings,
        }
    }
}

impl<S: EventStore> PaymentService<S> {
    pub fn gateway_name(&self) -> &'static str {
        self.gateway.name()
    }

    /// Checks out the caller's cart and opens a hosted payment session for
    /// the new order. If the gateway cannot open one, the order is cancelled,
    /// its stock restored and its lines put back in the cart. Should that
    /// fail too, the caller gets [`CheckoutError::CompensationFailed`].
    #[tracing::instrument(skip(self, metadata), fields(user = %caller.user_id))]
    pub async fn start_checkout_session(
        &self,
        caller: &Caller,
        metadata: BTreeMap<String, Value>,
    ) -> Result<CheckoutSession> {
        let customer_email = metadata
            .get("email")
            .and_then(Value::as_str)
            .map(str::to_string);
        let receipt = self
            .orchestrator
            .checkout(
                caller.user_id,
                CheckoutRequest {
                    gateway: Some(self.gateway.name().to_string()),
                    metadata,
                },
            )
            .await?;
        let order_id = receipt.order_id;

        let request = SessionRequest {
            line_items: self.line_items(&receipt.lines).await?,
            currency: self.settings.currency.clone(),
            success_url: format!(
                "{}/order/success?session_id={SESSION_ID_PLACEHOLDER}&order_id={order_id}",
                self.settings.frontend_url
            ),
            cancel_url: format!("{}/cart", self.settings.frontend_url),
            metadata: BTreeMap::from([
                (ORDER_ID_KEY.to_string(), order_id.to_string()),
                (USER_ID_KEY.to_string(), caller.user_id.to_string()),
            ]),
            customer_email,
            expires_at: Utc::now() + self.settings.session_ttl,
        };

        let session = match self.gateway.create_session(request).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(%order_id, error = %e, "could not open payment session");
                return Err(
                    match self.reconciler.abandon_checkout(order_id, &e.to_string()).await {
                        Ok(_) => CheckoutError::Gateway(e),
                        Err(compensation) => {
                            tracing::error!(
                                %order_id,
                                error = %compensation,
                                "abandoning checkout failed, order left pending"
                            );
                            CheckoutError::CompensationFailed {
                                order_id,
                                gateway: e,
                                compensation: Box::new(compensation),
                            }
                        }
                    },
                );
            }
        };

        let gateway = self.gateway.name();
        self.orders
            .handler()
            .execute(order_id, |order| {
                order.open_payment_session(gateway, &session.session_id)
            })
            .await?;

        tracing::info!(%order_id, session_id = %session.session_id, "payment session opened");
        Ok(CheckoutSession {
            order_id,
            session_id: session.session_id,
            redirect_url: session.redirect_url,
            sub_total: receipt.sub_total,
        })
    }

    async fn line_items(&self, lines: &[OrderLine]) -> Result<Vec<SessionLineItem>> {
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let image = self
                .products
                .find_by_id(line.product_id)
                .await?
                .and_then(|p| p.thumbnail().map(str::to_string));
            let description = (!line.selected_options.is_empty()).then(|| {
                let options: Vec<String> = line
                    .selected_options
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                format!("Options: {}", options.join(", "))
            });
            items.push(SessionLineItem {
                name: line.title.clone(),
                description,
                image,
                unit_amount: line.price,
                quantity: line.quantity,
            });
        }
        Ok(items)
    }

    /// Reports the live gateway state of a session together with its order.
    /// Never transitions the order.
    #[tracing::instrument(skip(self), fields(user = %caller.user_id))]
    pub async fn verify_session(
        &self,
        caller: &Caller,
        session_id: &str,
    ) -> Result<SessionVerification> {
        let session = self
            .gateway
            .retrieve_session(session_id)
            .await
            .map_err(|e| match e {
                GatewayError::SessionNotFound(id) => CheckoutError::not_found("Session", id),
                other => CheckoutError::Gateway(other),
            })?;

        let raw_order_id = session.metadata.get(ORDER_ID_KEY).ok_or_else(|| {
            CheckoutError::Validation("session carries no order id".to_string())
        })?;
        let order_id = raw_order_id
            .parse::<AggregateId>()
            .map_err(|_| {
                CheckoutError::Validation(format!("invalid order id on session: {raw_order_id}"))
            })?;

        let order = self.orders.get(order_id).await?;
        if !order.is_owned_by(caller.user_id) {
            return Err(CheckoutError::Authorization(
                "order belongs to another user".to_string(),
            ));
        }

        Ok(SessionVerification {
            payment_status: session.payment_status,
            session_status: session.status,
            order,
        })
    }

    /// Refunds a paid order in full or in part. Stock for every line is
    /// restored either way.
    #[tracing::instrument(skip(self), fields(user = %caller.user_id))]
    pub async fn request_refund(
        &self,
        caller: &Caller,
        order_id: AggregateId,
        amount: Option<Money>,
    ) -> Result<RefundReceipt> {
        let order = self.orders.get(order_id).await?;
        if !order.is_owned_by(caller.user_id) {
            return Err(CheckoutError::Authorization(
                "order belongs to another user".to_string(),
            ));
        }
        if order.payment_status() != PaymentStatus::Paid {
            return Err(CheckoutError::InvalidState(format!(
                "only paid orders can be refunded (payment is {})",
                order.payment_status()
            )));
        }
        let transaction_id = order.payment().transaction_id.clone().ok_or_else(|| {
            CheckoutError::Precondition("order has no payment transaction".to_string())
        })?;
        if let Some(amount) = amount
            && (!amount.is_positive() || amount > order.sub_total())
        {
            return Err(CheckoutError::Validation(format!(
                "refund amount must be positive and at most {}",
                order.sub_total()
            )));
        }

        let refund = self
            .gateway
            .create_refund(&transaction_id, RefundAmount::from_option(amount))
            .await?;
        let transition = self
            .reconciler
            .record_refund(order_id, Some(refund.refund_id.clone()), amount, None)
            .await?;

        tracing::info!(%order_id, refund_id = %refund.refund_id, "refund issued");
        Ok(RefundReceipt {
            order_id,
            refund_id: refund.refund_id,
            amount,
            transition,
        })
    }

    /// Verifies and applies a raw webhook delivery.
    #[tracing::instrument(skip_all)]
    pub async fn handle_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<Transition> {
        let verifier = self.verifier.as_ref().ok_or_else(|| {
            CheckoutError::Precondition("webhook secret is not configured".to_string())
        })?;
        let signature = signature.ok_or_else(|| {
            CheckoutError::InvalidSignature("missing signature header".to_string())
        })?;
        verifier.verify(payload, signature)?;

        let event = parse_event(payload)?;
        self.reconciler.apply(event).await
    }
}

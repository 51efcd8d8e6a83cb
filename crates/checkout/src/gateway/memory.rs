//! In-process gateway for tests and local runs without gateway credentials.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    GatewayError, GatewayRefund, GatewaySession, PayableSession, PaymentGateway, RefundAmount,
    SessionPaymentStatus, SessionRequest, SessionStatus,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRefund {
    pub refund_id: String,
    pub transaction_id: String,
    pub amount: RefundAmount,
}

#[derive(Debug)]
struct StoredSession {
    request: SessionRequest,
    payment_status: SessionPaymentStatus,
    status: SessionStatus,
    payment_intent: Option<String>,
}

impl StoredSession {
    fn view(&self, session_id: &str) -> GatewaySession {
        GatewaySession {
            session_id: session_id.to_string(),
            payment_status: self.payment_status,
            status: self.status,
            payment_intent: self.payment_intent.clone(),
            metadata: self.request.metadata.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    sessions: HashMap<String, StoredSession>,
    refunds: Vec<RecordedRefund>,
    next_session: u32,
    next_intent: u32,
    fail_on_create: bool,
    fail_on_refund: bool,
}

/// Gateway that keeps sessions in memory. Ids mimic the real provider's
/// shape (`cs_test_0001`, `pi_test_0001`, `re_test_0001`).
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    pub async fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().await.fail_on_refund = fail;
    }

    /// Marks a session as paid, as if the buyer finished the hosted page.
    /// Returns the completed session, or None for an unknown id.
    pub async fn complete_session(&self, session_id: &str) -> Option<GatewaySession> {
        let mut state = self.state.write().await;
        state.next_intent += 1;
        let intent = format!("pi_test_{:04}", state.next_intent);

        let session = state.sessions.get_mut(session_id)?;
        session.payment_status = SessionPaymentStatus::Paid;
        session.status = SessionStatus::Complete;
        session.payment_intent.get_or_insert(intent);
        Some(session.view(session_id))
    }

    pub async fn session_request(&self, session_id: &str) -> Option<SessionRequest> {
        self.state
            .read()
            .await
            .sessions
            .get(session_id)
            .map(|s| s.request.clone())
    }

    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    pub async fn refunds(&self) -> Vec<RecordedRefund> {
        self.state.read().await.refunds.clone()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    fn name(&self) -> &'static str {
        "in_memory"
    }

    async fn create_session(
        &self,
        request: SessionRequest,
    ) -> Result<PayableSession, GatewayError> {
        let mut state = self.state.write().await;
        if state.fail_on_create {
            return Err(GatewayError::Transport("gateway unavailable".to_string()));
        }

        state.next_session += 1;
        let session_id = format!("cs_test_{:04}", state.next_session);
        let redirect_url = Some(format!("https://checkout.invalid/pay/{session_id}"));
        state.sessions.insert(
            session_id.clone(),
            StoredSession {
                request,
                payment_status: SessionPaymentStatus::Unpaid,
                status: SessionStatus::Open,
                payment_intent: None,
            },
        );

        Ok(PayableSession {
            session_id,
            redirect_url,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<GatewaySession, GatewayError> {
        self.state
            .read()
            .await
            .sessions
            .get(session_id)
            .map(|s| s.view(session_id))
            .ok_or_else(|| GatewayError::SessionNotFound(session_id.to_string()))
    }

    async fn create_refund(
        &self,
        transaction_id: &str,
        amount: RefundAmount,
    ) -> Result<GatewayRefund, GatewayError> {
        let mut state = self.state.write().await;
        if state.fail_on_refund {
            return Err(GatewayError::Rejected {
                status: 402,
                message: "refund declined".to_string(),
            });
        }

        let refund_id = format!("re_test_{:04}", state.refunds.len() + 1);
        state.refunds.push(RecordedRefund {
            refund_id: refund_id.clone(),
            transaction_id: transaction_id.to_string(),
            amount,
        });
        Ok(GatewayRefund { refund_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SessionLineItem;
    use chrono::Utc;
    use domain::Money;
    use std::collections::BTreeMap;

    fn request() -> SessionRequest {
        SessionRequest {
            line_items: vec![SessionLineItem {
                name: "Mug".to_string(),
                description: None,
                image: None,
                unit_amount: Money::from_cents(900),
                quantity: 1,
            }],
            currency: "usd".to_string(),
            success_url: "http://localhost/ok".to_string(),
            cancel_url: "http://localhost/cart".to_string(),
            metadata: BTreeMap::from([("order_id".to_string(), "o-1".to_string())]),
            customer_email: None,
            expires_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sessions_open_unpaid_and_complete_with_an_intent() {
        let gateway = InMemoryGateway::new();
        let session = gateway.create_session(request()).await.unwrap();
        assert_eq!(session.session_id, "cs_test_0001");

        let live = gateway.retrieve_session("cs_test_0001").await.unwrap();
        assert_eq!(live.payment_status, SessionPaymentStatus::Unpaid);
        assert_eq!(live.metadata["order_id"], "o-1");

        let done = gateway.complete_session("cs_test_0001").await.unwrap();
        assert_eq!(done.status, SessionStatus::Complete);
        assert_eq!(done.payment_intent.as_deref(), Some("pi_test_0001"));
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let gateway = InMemoryGateway::new();
        assert!(matches!(
            gateway.retrieve_session("cs_missing").await,
            Err(GatewayError::SessionNotFound(_))
        ));
        assert!(gateway.complete_session("cs_missing").await.is_none());
    }

    #[tokio::test]
    async fn failure_toggles() {
        let gateway = InMemoryGateway::new();
        gateway.set_fail_on_create(true).await;
        gateway.set_fail_on_refund(true).await;

        assert!(gateway.create_session(request()).await.is_err());
        assert!(gateway.create_refund("pi_1", RefundAmount::Full).await.is_err());
        assert_eq!(gateway.session_count().await, 0);
        assert!(gateway.refunds().await.is_empty());
    }

    #[tokio::test]
    async fn refunds_are_recorded() {
        let gateway = InMemoryGateway::new();
        let refund = gateway
            .create_refund("pi_9", RefundAmount::Partial(Money::from_cents(100)))
            .await
            .unwrap();

        assert_eq!(refund.refund_id, "re_test_0001");
        assert_eq!(
            gateway.refunds().await,
            vec![RecordedRefund {
                refund_id: "re_test_0001".to_string(),
                transaction_id: "pi_9".to_string(),
                amount: RefundAmount::Partial(Money::from_cents(100)),
            }]
        );
    }
}

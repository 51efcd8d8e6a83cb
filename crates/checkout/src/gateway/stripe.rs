//! Stripe REST adapter (form-encoded requests, bearer auth).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{
    GatewayError, GatewayRefund, GatewaySession, PayableSession, PaymentGateway, RefundAmount,
    SessionPaymentStatus, SessionRequest, SessionStatus,
};

pub struct StripeGateway {
    client: Client,
    secret_key: String,
    api_base: String,
}

#[derive(Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
    payment_status: SessionPaymentStatus,
    status: Option<SessionStatus>,
    payment_intent: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct StripeRefund {
    id: String,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(
        secret_key: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            secret_key: secret_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_base, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = request
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StripeErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or_else(|| body.chars().take(200).collect());
        tracing::warn!(status = %status, %message, "stripe request failed");

        Err(GatewayError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

/// Form fields for `POST /v1/checkout/sessions`.
pub(crate) fn session_form_params(request: &SessionRequest) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        ("payment_method_types[0]".into(), "card".into()),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
        ("expires_at".into(), request.expires_at.timestamp().to_string()),
    ];

    if let Some(email) = &request.customer_email {
        params.push(("customer_email".into(), email.clone()));
    }

    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        params.push((
            format!("{prefix}[price_data][currency]"),
            request.currency.clone(),
        ));
        params.push((
            format!("{prefix}[price_data][unit_amount]"),
            item.unit_amount.cents().to_string(),
        ));
        params.push((
            format!("{prefix}[price_data][product_data][name]"),
            item.name.clone(),
        ));
        if let Some(description) = &item.description {
            params.push((
                format!("{prefix}[price_data][product_data][description]"),
                description.clone(),
            ));
        }
        if let Some(image) = &item.image {
            params.push((
                format!("{prefix}[price_data][product_data][images][0]"),
                image.clone(),
            ));
        }
        params.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
    }

    // The payment intent carries the same keys so failure events resolve too.
    for (key, value) in &request.metadata {
        params.push((format!("metadata[{key}]"), value.clone()));
        params.push((
            format!("payment_intent_data[metadata][{key}]"),
            value.clone(),
        ));
    }

    params
}

pub(crate) fn refund_form_params(
    transaction_id: &str,
    amount: RefundAmount,
) -> Vec<(String, String)> {
    let mut params = vec![("payment_intent".to_string(), transaction_id.to_string())];
    if let RefundAmount::Partial(amount) = amount {
        params.push(("amount".to_string(), amount.cents().to_string()));
    }
    params
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn name(&self) -> &'static str {
        "stripe"
    }

    #[tracing::instrument(skip(self, request), fields(lines = request.line_items.len()))]
    async fn create_session(
        &self,
        request: SessionRequest,
    ) -> Result<PayableSession, GatewayError> {
        let params = session_form_params(&request);
        let session: StripeSession = self
            .send(self.client.post(self.url("checkout/sessions")).form(&params))
            .await?;

        Ok(PayableSession {
            session_id: session.id,
            redirect_url: session.url,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn retrieve_session(&self, session_id: &str) -> Result<GatewaySession, GatewayError> {
        let url = self.url(&format!("checkout/sessions/{session_id}"));
        let session: StripeSession = match self.send(self.client.get(url)).await {
            Err(GatewayError::Rejected { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                return Err(GatewayError::SessionNotFound(session_id.to_string()));
            }
            other => other?,
        };

        Ok(GatewaySession {
            session_id: session.id,
            payment_status: session.payment_status,
            status: session.status.unwrap_or(SessionStatus::Unknown),
            payment_intent: session.payment_intent,
            metadata: session.metadata,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn create_refund(
        &self,
        transaction_id: &str,
        amount: RefundAmount,
    ) -> Result<GatewayRefund, GatewayError> {
        let params = refund_form_params(transaction_id, amount);
        let refund: StripeRefund = self
            .send(self.client.post(self.url("refunds")).form(&params))
            .await?;

        Ok(GatewayRefund {
            refund_id: refund.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SessionLineItem;
    use chrono::{TimeZone, Utc};
    use domain::Money;

    fn value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn session_params_encode_lines_and_metadata() {
        let request = SessionRequest {
            line_items: vec![
                SessionLineItem {
                    name: "Tee".to_string(),
                    description: Some("Options: size=L".to_string()),
                    image: Some("https://img.example/tee.png".to_string()),
                    unit_amount: Money::from_cents(2000),
                    quantity: 2,
                },
                SessionLineItem {
                    name: "Mug".to_string(),
                    description: None,
                    image: None,
                    unit_amount: Money::from_cents(850),
                    quantity: 1,
                },
            ],
            currency: "usd".to_string(),
            success_url: "http://localhost:5173/order/success".to_string(),
            cancel_url: "http://localhost:5173/cart".to_string(),
            metadata: BTreeMap::from([("order_id".to_string(), "abc".to_string())]),
            customer_email: Some("buyer@example.com".to_string()),
            expires_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        };

        let params = session_form_params(&request);

        assert_eq!(value(&params, "mode"), Some("payment"));
        assert_eq!(value(&params, "expires_at"), Some("1700000000"));
        assert_eq!(value(&params, "customer_email"), Some("buyer@example.com"));
        assert_eq!(
            value(&params, "line_items[0][price_data][unit_amount]"),
            Some("2000")
        );
        assert_eq!(value(&params, "line_items[0][quantity]"), Some("2"));
        assert_eq!(
            value(&params, "line_items[0][price_data][product_data][images][0]"),
            Some("https://img.example/tee.png")
        );
        assert_eq!(
            value(&params, "line_items[1][price_data][product_data][name]"),
            Some("Mug")
        );
        assert_eq!(
            value(&params, "line_items[1][price_data][product_data][description]"),
            None
        );
        assert_eq!(value(&params, "metadata[order_id]"), Some("abc"));
        assert_eq!(
            value(&params, "payment_intent_data[metadata][order_id]"),
            Some("abc")
        );
    }

    #[test]
    fn refund_params_only_carry_amount_when_partial() {
        let full = refund_form_params("pi_1", RefundAmount::Full);
        assert_eq!(full, vec![("payment_intent".to_string(), "pi_1".to_string())]);

        let partial = refund_form_params("pi_1", RefundAmount::Partial(Money::from_cents(500)));
        assert_eq!(value(&partial, "amount"), Some("500"));
    }

    #[test]
    fn session_payload_tolerates_unknown_statuses() {
        let session: StripeSession = serde_json::from_value(serde_json::json!({
            "id": "cs_1",
            "url": null,
            "payment_status": "something_new",
            "status": "complete",
            "payment_intent": "pi_1",
            "metadata": {"order_id": "abc"}
        }))
        .unwrap();

        assert_eq!(session.payment_status, SessionPaymentStatus::Unknown);
        assert_eq!(session.status, Some(SessionStatus::Complete));
    }
}

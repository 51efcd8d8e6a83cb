//! Inbound gateway webhooks: signature verification and event parsing.
//!
//! Signatures follow the `Stripe-Signature: t=<unix>,v1=<hex>` scheme, an
//! HMAC-SHA256 over `"{t}.{raw body}"`. Verification always runs on the raw
//! bytes before anything is parsed.

use std::collections::BTreeMap;

use chrono::Utc;
use common::AggregateId;
use domain::Money;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use crate::error::{CheckoutError, Result};
use crate::gateway::{ORDER_ID_KEY, SessionPaymentStatus};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    pub fn verify(&self, payload: &[u8], header: &str) -> Result<()> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verifies `header` against `payload` as of the unix time `now`.
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<()> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let (Some(timestamp), false) = (timestamp, signatures.is_empty()) else {
            return Err(CheckoutError::InvalidSignature(
                "malformed signature header".to_string(),
            ));
        };
        if now.abs_diff(timestamp) > self.tolerance_secs.max(0).unsigned_abs() {
            return Err(CheckoutError::InvalidSignature(
                "timestamp outside the tolerance window".to_string(),
            ));
        }

        for signature in signatures {
            let Ok(expected) = hex::decode(signature) else {
                continue;
            };
            // verify_slice compares in constant time.
            if self.mac(timestamp, payload)?.verify_slice(&expected).is_ok() {
                return Ok(());
            }
        }

        Err(CheckoutError::InvalidSignature(
            "no signature matches the payload".to_string(),
        ))
    }

    /// Builds a signature header for `payload`, as the gateway would send it.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String> {
        let digest = self.mac(timestamp, payload)?.finalize().into_bytes();
        Ok(format!("t={timestamp},v1={}", hex::encode(digest)))
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
            return Err(CheckoutError::InvalidSignature(
                "unusable webhook secret".to_string(),
            ));
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

/// A verified gateway notification, narrowed to what reconciliation needs.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// `checkout.session.completed`
    SessionCompleted {
        event_id: String,
        session_id: String,
        order_id: AggregateId,
        payment_status: SessionPaymentStatus,
        transaction_id: Option<String>,
        raw: Value,
    },
    /// `payment_intent.payment_failed`
    PaymentFailed {
        event_id: String,
        transaction_id: String,
        order_id: Option<AggregateId>,
        reason: String,
        raw: Value,
    },
    /// `charge.refunded`
    ChargeRefunded {
        event_id: String,
        transaction_id: String,
        refund_id: Option<String>,
        amount_refunded: Option<Money>,
        raw: Value,
    },
    Unhandled {
        event_id: String,
        event_type: String,
    },
}

impl GatewayEvent {
    /// Label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayEvent::SessionCompleted { .. } => "session_completed",
            GatewayEvent::PaymentFailed { .. } => "payment_failed",
            GatewayEvent::ChargeRefunded { .. } => "charge_refunded",
            GatewayEvent::Unhandled { .. } => "unhandled",
        }
    }
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: Value,
}

#[derive(Deserialize)]
struct SessionObject {
    id: String,
    payment_intent: Option<String>,
    payment_status: Option<SessionPaymentStatus>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct PaymentIntentObject {
    id: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    last_payment_error: Option<PaymentErrorObject>,
}

#[derive(Deserialize)]
struct PaymentErrorObject {
    message: Option<String>,
}

#[derive(Deserialize)]
struct ChargeObject {
    payment_intent: Option<String>,
    amount_refunded: Option<i64>,
    refunds: Option<RefundList>,
}

#[derive(Deserialize)]
struct RefundList {
    #[serde(default)]
    data: Vec<RefundObject>,
}

#[derive(Deserialize)]
struct RefundObject {
    id: String,
}

fn invalid(event_type: &str, err: impl std::fmt::Display) -> CheckoutError {
    CheckoutError::Validation(format!("malformed {event_type} payload: {err}"))
}

fn parse_order_id(raw: &str) -> Result<AggregateId> {
    raw.parse::<AggregateId>()
        .map_err(|_| CheckoutError::Validation(format!("invalid order id in metadata: {raw}")))
}

/// Parses an already verified payload into a [`GatewayEvent`].
pub fn parse_event(payload: &[u8]) -> Result<GatewayEvent> {
    let event: RawEvent = serde_json::from_slice(payload)
        .map_err(|e| CheckoutError::Validation(format!("malformed webhook payload: {e}")))?;
    let RawEvent {
        id: event_id,
        event_type,
        data: RawEventData { object: raw },
    } = event;

    match event_type.as_str() {
        "checkout.session.completed" => {
            let session: SessionObject =
                serde_json::from_value(raw.clone()).map_err(|e| invalid(&event_type, e))?;
            let order_id = session.metadata.get(ORDER_ID_KEY).ok_or_else(|| {
                CheckoutError::Validation("completed session carries no order id".to_string())
            })?;
            Ok(GatewayEvent::SessionCompleted {
                event_id,
                order_id: parse_order_id(order_id)?,
                session_id: session.id,
                payment_status: session
                    .payment_status
                    .unwrap_or(SessionPaymentStatus::Unknown),
                transaction_id: session.payment_intent,
                raw,
            })
        }
        "payment_intent.payment_failed" => {
            let intent: PaymentIntentObject =
                serde_json::from_value(raw.clone()).map_err(|e| invalid(&event_type, e))?;
            let order_id = intent
                .metadata
                .get(ORDER_ID_KEY)
                .map(|id| parse_order_id(id))
                .transpose()?;
            let reason = intent
                .last_payment_error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "payment failed".to_string());
            Ok(GatewayEvent::PaymentFailed {
                event_id,
                transaction_id: intent.id,
                order_id,
                reason,
                raw,
            })
        }
        "charge.refunded" => {
            let charge: ChargeObject =
                serde_json::from_value(raw.clone()).map_err(|e| invalid(&event_type, e))?;
            let transaction_id = charge.payment_intent.ok_or_else(|| {
                CheckoutError::Validation("refunded charge has no payment intent".to_string())
            })?;
            Ok(GatewayEvent::ChargeRefunded {
                event_id,
                transaction_id,
                refund_id: charge
                    .refunds
                    .and_then(|r| r.data.into_iter().next())
                    .map(|r| r.id),
                amount_refunded: charge.amount_refunded.map(Money::from_cents),
                raw,
            })
        }
        _ => Ok(GatewayEvent::Unhandled {
            event_id,
            event_type,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SECRET, DEFAULT_TOLERANCE_SECS)
    }

    #[test]
    fn accepts_its_own_signature() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = verifier().sign(payload, NOW).unwrap();
        assert!(verifier().verify_at(payload, &header, NOW + 10).is_ok());
    }

    #[test]
    fn rejects_tampered_payload() {
        let header = verifier().sign(b"{\"amount\":100}", NOW).unwrap();
        assert!(matches!(
            verifier().verify_at(b"{\"amount\":999}", &header, NOW),
            Err(CheckoutError::InvalidSignature(_))
        ));
    }

    #[test]
    fn rejects_wrong_secret() {
        let header = WebhookVerifier::new("other", 300).sign(b"{}", NOW).unwrap();
        assert!(verifier().verify_at(b"{}", &header, NOW).is_err());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let header = verifier().sign(b"{}", NOW - 600).unwrap();
        assert!(verifier().verify_at(b"{}", &header, NOW).is_err());
    }

    #[test]
    fn rejects_malformed_headers() {
        for header in [
            "",
            "t=abc,v1=00",
            "v1=deadbeef",
            "t=1700000000",
            "garbage",
            "t=-9223372036854775808,v1=00",
            "t=9223372036854775807,v1=00",
        ] {
            assert!(
                verifier().verify_at(b"{}", header, NOW).is_err(),
                "accepted {header:?}"
            );
        }
    }

    #[test]
    fn any_matching_v1_is_enough() {
        let good = verifier().sign(b"{}", NOW).unwrap();
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1=00ff,v1={good_sig}");
        assert!(verifier().verify_at(b"{}", &header, NOW).is_ok());
    }

    fn payload(event_type: &str, object: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": event_type,
            "data": { "object": object }
        }))
        .unwrap()
    }

    #[test]
    fn parses_completed_session() {
        let order_id = AggregateId::new();
        let event = parse_event(&payload(
            "checkout.session.completed",
            json!({
                "id": "cs_1",
                "payment_intent": "pi_1",
                "payment_status": "paid",
                "metadata": { "order_id": order_id.to_string(), "user_id": "u" }
            }),
        ))
        .unwrap();

        match event {
            GatewayEvent::SessionCompleted {
                order_id: parsed,
                session_id,
                payment_status,
                transaction_id,
                ..
            } => {
                assert_eq!(parsed, order_id);
                assert_eq!(session_id, "cs_1");
                assert_eq!(payment_status, SessionPaymentStatus::Paid);
                assert_eq!(transaction_id.as_deref(), Some("pi_1"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn completed_session_without_order_id_is_invalid() {
        let result = parse_event(&payload(
            "checkout.session.completed",
            json!({ "id": "cs_1", "payment_intent": "pi_1", "metadata": {} }),
        ));
        assert!(matches!(result, Err(CheckoutError::Validation(_))));
    }

    #[test]
    fn parses_payment_failure_with_reason() {
        let event = parse_event(&payload(
            "payment_intent.payment_failed",
            json!({
                "id": "pi_2",
                "metadata": {},
                "last_payment_error": { "message": "card declined" }
            }),
        ))
        .unwrap();

        assert!(matches!(
            event,
            GatewayEvent::PaymentFailed { ref transaction_id, order_id: None, ref reason, .. }
                if transaction_id == "pi_2" && reason == "card declined"
        ));
    }

    #[test]
    fn parses_refunded_charge() {
        let event = parse_event(&payload(
            "charge.refunded",
            json!({
                "id": "ch_1",
                "payment_intent": "pi_3",
                "amount_refunded": 1500,
                "refunds": { "data": [ { "id": "re_1" } ] }
            }),
        ))
        .unwrap();

        assert_eq!(
            event,
            GatewayEvent::ChargeRefunded {
                event_id: "evt_1".to_string(),
                transaction_id: "pi_3".to_string(),
                refund_id: Some("re_1".to_string()),
                amount_refunded: Some(Money::from_cents(1500)),
                raw: json!({
                    "id": "ch_1",
                    "payment_intent": "pi_3",
                    "amount_refunded": 1500,
                    "refunds": { "data": [ { "id": "re_1" } ] }
                }),
            }
        );
    }

    #[test]
    fn unknown_types_are_unhandled() {
        let event = parse_event(&payload("customer.created", json!({ "id": "cus_1" }))).unwrap();
        assert_eq!(event.kind(), "unhandled");
    }

    #[test]
    fn garbage_is_a_validation_error() {
        assert!(matches!(
            parse_event(b"not json"),
            Err(CheckoutError::Validation(_))
        ));
    }
}

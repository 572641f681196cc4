//! Payment notification webhook
//!
//! Bank or payment-provider notifications are verified, stored once per event
//! id and matched against pending subscriptions for the admin's benefit.
//! Subscription state is never changed here: confirming a payment stays a
//! manual admin action.

use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::subscriptions::SubscriptionService;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex encoded HMAC-SHA256 of the raw body
pub const SIGNATURE_HEADER: &str = "x-payment-signature";

/// Notification body. Unknown fields are kept in the stored payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentNotification {
    pub event_id: String,
    #[serde(default)]
    pub variable_symbol: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Recorded {
        matched_subscription: Option<Uuid>,
    },
    Duplicate,
}

/// Hex HMAC-SHA256 of `payload` under `secret`
pub fn sign_payload(secret: &str, payload: &[u8]) -> BillingResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BillingError::Internal(format!("Invalid webhook secret: {}", e)))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> BillingResult<()> {
    let expected = hex::decode(signature.trim()).map_err(|_| {
        tracing::warn!("Payment webhook signature is not valid hex");
        BillingError::WebhookSignatureInvalid
    })?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BillingError::Internal(format!("Invalid webhook secret: {}", e)))?;
    mac.update(payload);
    mac.verify_slice(&expected).map_err(|_| {
        tracing::warn!("Payment webhook signature mismatch");
        BillingError::WebhookSignatureInvalid
    })
}

#[derive(Clone)]
pub struct PaymentWebhookHandler {
    pool: PgPool,
    secret: Option<String>,
    subscriptions: SubscriptionService,
}

impl PaymentWebhookHandler {
    pub fn new(pool: PgPool, secret: Option<String>) -> Self {
        if secret.is_none() {
            tracing::warn!("PAYMENT_WEBHOOK_SECRET not set, payment webhooks are accepted unsigned");
        }
        Self {
            subscriptions: SubscriptionService::new(pool.clone()),
            pool,
            secret,
        }
    }

    fn authenticate(&self, payload: &[u8], signature: Option<&str>) -> BillingResult<()> {
        match (&self.secret, signature) {
            (Some(secret), Some(sig)) => verify_signature(secret, payload, sig),
            (Some(_), None) => {
                tracing::warn!("Payment webhook without signature rejected");
                Err(BillingError::WebhookSignatureInvalid)
            }
            (None, _) => Ok(()),
        }
    }

    /// Verify, parse and record a notification.
    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> BillingResult<WebhookOutcome> {
        self.authenticate(payload, signature)?;

        let raw: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| BillingError::InvalidInput(format!("Invalid webhook payload: {}", e)))?;
        let notification: PaymentNotification = serde_json::from_value(raw.clone())
            .map_err(|e| BillingError::InvalidInput(format!("Invalid webhook payload: {}", e)))?;

        if notification.event_id.trim().is_empty() {
            return Err(BillingError::InvalidInput(
                "event_id must not be empty".to_string(),
            ));
        }

        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO payment_webhook_events (id, event_id, payload)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&notification.event_id)
        .bind(&raw)
        .fetch_optional(&self.pool)
        .await?;

        if inserted.is_none() {
            tracing::info!(
                event_id = %notification.event_id,
                "Duplicate payment webhook ignored"
            );
            return Ok(WebhookOutcome::Duplicate);
        }

        let matched = match notification.variable_symbol.as_deref() {
            Some(vs) => self.subscriptions.find_pending_by_variable_symbol(vs).await?,
            None => None,
        };

        match &matched {
            Some(sub) => tracing::info!(
                event_id = %notification.event_id,
                subscription_id = %sub.id,
                user_id = %sub.user_id,
                amount = ?notification.amount,
                "Payment notification matches a pending subscription, awaiting admin confirmation"
            ),
            None => tracing::info!(
                event_id = %notification.event_id,
                variable_symbol = ?notification.variable_symbol,
                "Payment notification recorded"
            ),
        }

        Ok(WebhookOutcome::Recorded {
            matched_subscription: matched.map(|s| s.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"event_id":"evt_1","variable_symbol":"1234567890"}"#;
        let sig = sign_payload(SECRET, body).unwrap();
        assert_eq!(sig.len(), 64);
        assert!(verify_signature(SECRET, body, &sig).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let sig = sign_payload(SECRET, br#"{"event_id":"evt_1","amount":"149"}"#).unwrap();
        let result = verify_signature(SECRET, br#"{"event_id":"evt_1","amount":"1"}"#, &sig);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn test_non_hex_signature_rejected() {
        let result = verify_signature(SECRET, b"{}", "not-hex");
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn test_notification_parses_optional_fields() {
        let n: PaymentNotification =
            serde_json::from_str(r#"{"event_id":"evt_9","amount":"149.00","extra":1}"#).unwrap();
        assert_eq!(n.event_id, "evt_9");
        assert_eq!(n.amount, Some(Decimal::new(14900, 2)));
        assert!(n.variable_symbol.is_none());
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(WebhookOutcome::Duplicate).unwrap();
        assert_eq!(json["result"], "duplicate");
    }
}

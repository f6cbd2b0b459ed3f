use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;

/// Paid-quota credits granted by the one-time purchase price.
pub const ONE_TIME_CREDITS: i64 = 500;

/// Stripe webhook event types we handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StripeEventType {
    CheckoutSessionCompleted,
    CustomerSubscriptionUpdated,
    CustomerSubscriptionDeleted,
    InvoicePaid,
    Unknown(String),
}

impl From<&str> for StripeEventType {
    fn from(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "customer.subscription.updated" => Self::CustomerSubscriptionUpdated,
            "customer.subscription.deleted" => Self::CustomerSubscriptionDeleted,
            "invoice.paid" => Self::InvoicePaid,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Result of processing a Stripe webhook event.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookOutcome {
    pub event_type: String,
    pub action: String,
    pub user_id: Option<String>,
}

/// Verify a Stripe webhook signature over the exact raw payload bytes.
///
/// Stripe signature header format: `t=timestamp,v1=signature`.
pub fn verify_webhook_signature(payload: &[u8], signature: &str, webhook_secret: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let parts: std::collections::HashMap<&str, &str> = signature
        .split(',')
        .filter_map(|part| part.split_once('='))
        .collect();

    let timestamp = match parts.get("t") {
        Some(t) => *t,
        None => return false,
    };

    let expected_sig = match parts.get("v1") {
        Some(s) => *s,
        None => return false,
    };

    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));

    type HmacSha256 = Hmac<Sha256>;
    let Ok(mut mac) = HmacSha256::new_from_slice(webhook_secret.as_bytes()) else {
        return false;
    };
    mac.update(signed_payload.as_bytes());

    let computed = hex::encode(mac.finalize().into_bytes());
    computed == expected_sig
}

/// Apply a verified Stripe event to the entitlement store.
///
/// Only `checkout.session.completed` mutates state; the other recognized
/// event types are logged for later reconciliation. Unrecognized events are
/// ignored so the provider never retries them.
pub async fn apply_webhook_event(
    db: &dyn Database,
    config: &Config,
    event: &serde_json::Value,
) -> Result<WebhookOutcome> {
    let event_type = event
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    let customer_meta = |key: &str| {
        event
            .pointer(&format!("/data/object/metadata/{key}"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };

    match StripeEventType::from(event_type) {
        StripeEventType::CheckoutSessionCompleted => {
            let user_id = customer_meta("userId");
            let price_id = customer_meta("priceId").unwrap_or_default();

            let Some(user_id) = user_id else {
                warn!(event_type, "checkout completed without userId metadata, ignoring");
                return Ok(WebhookOutcome {
                    event_type: event_type.to_string(),
                    action: "ignored".to_string(),
                    user_id: None,
                });
            };

            if !config.stripe_price_subscription.is_empty()
                && price_id == config.stripe_price_subscription
            {
                db.reset_entitlements(&user_id).await?;
                info!(user_id = %user_id, "subscription activated, entitlements reset");
                Ok(WebhookOutcome {
                    event_type: event_type.to_string(),
                    action: "subscription_activated".to_string(),
                    user_id: Some(user_id),
                })
            } else if !config.stripe_price_credits.is_empty()
                && price_id == config.stripe_price_credits
            {
                db.add_paid_quota(&user_id, ONE_TIME_CREDITS).await?;
                info!(user_id = %user_id, credits = ONE_TIME_CREDITS, "one-time credits added");
                Ok(WebhookOutcome {
                    event_type: event_type.to_string(),
                    action: "credits_added".to_string(),
                    user_id: Some(user_id),
                })
            } else {
                warn!(user_id = %user_id, price_id = %price_id, "checkout for unrecognized price, ignoring");
                Ok(WebhookOutcome {
                    event_type: event_type.to_string(),
                    action: "ignored".to_string(),
                    user_id: Some(user_id),
                })
            }
        }
        StripeEventType::InvoicePaid
        | StripeEventType::CustomerSubscriptionUpdated
        | StripeEventType::CustomerSubscriptionDeleted => {
            // Placeholder for future entitlement reconciliation.
            info!(event_type, "recognized Stripe event, no entitlement change");
            Ok(WebhookOutcome {
                event_type: event_type.to_string(),
                action: "logged".to_string(),
                user_id: None,
            })
        }
        StripeEventType::Unknown(t) => {
            info!(event_type = %t, "ignoring unknown Stripe event");
            Ok(WebhookOutcome {
                event_type: t,
                action: "ignored".to_string(),
                user_id: None,
            })
        }
    }
}

/// Produce a valid `stripe-signature` header for a payload. Test helper.
#[cfg(test)]
pub(crate) fn sign_payload(payload: &[u8], secret: &str, timestamp: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(signed_payload.as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fake::FakeDb;
    use crate::db::UsageRecord;

    fn checkout_event(user_id: &str, price_id: &str) -> serde_json::Value {
        serde_json::json!({
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "metadata": { "userId": user_id, "priceId": price_id }
                }
            }
        })
    }

    fn test_config() -> Config {
        Config {
            stripe_webhook_secret: "whsec_test".to_string(),
            stripe_price_subscription: "price_sub".to_string(),
            stripe_price_credits: "price_credits".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_event_type_from_str() {
        assert_eq!(
            StripeEventType::from("checkout.session.completed"),
            StripeEventType::CheckoutSessionCompleted
        );
        assert_eq!(
            StripeEventType::from("invoice.paid"),
            StripeEventType::InvoicePaid
        );
        assert!(matches!(
            StripeEventType::from("charge.refunded"),
            StripeEventType::Unknown(_)
        ));
    }

    #[test]
    fn test_signature_roundtrip() {
        let payload = br#"{"type":"invoice.paid"}"#;
        let signature = sign_payload(payload, "whsec_test", "1700000000");
        assert!(verify_webhook_signature(payload, &signature, "whsec_test"));
    }

    #[test]
    fn test_signature_wrong_secret_rejected() {
        let payload = br#"{"type":"invoice.paid"}"#;
        let signature = sign_payload(payload, "whsec_test", "1700000000");
        assert!(!verify_webhook_signature(payload, &signature, "whsec_other"));
    }

    #[test]
    fn test_signature_tampered_payload_rejected() {
        let payload = br#"{"type":"invoice.paid"}"#;
        let signature = sign_payload(payload, "whsec_test", "1700000000");
        assert!(!verify_webhook_signature(
            br#"{"type":"invoice.paid","amount":1}"#,
            &signature,
            "whsec_test"
        ));
    }

    #[test]
    fn test_signature_malformed_header_rejected() {
        assert!(!verify_webhook_signature(b"{}", "", "whsec_test"));
        assert!(!verify_webhook_signature(b"{}", "t=123", "whsec_test"));
        assert!(!verify_webhook_signature(b"{}", "v1=abc", "whsec_test"));
    }

    #[tokio::test]
    async fn test_subscription_checkout_resets_entitlements() {
        let db = FakeDb::new().with_usage(UsageRecord {
            user_id: "alice".to_string(),
            is_subscribed: false,
            message_count: 42,
            free_quota: 3,
            paid_quota: 100,
        });

        let outcome = apply_webhook_event(&db, &test_config(), &checkout_event("alice", "price_sub"))
            .await
            .unwrap();
        assert_eq!(outcome.action, "subscription_activated");

        let usage = db.usage_for("alice").unwrap();
        assert!(usage.is_subscribed);
        assert_eq!(usage.message_count, 0);
        assert_eq!(usage.free_quota, 0);
        assert_eq!(usage.paid_quota, 0);
    }

    #[tokio::test]
    async fn test_one_time_purchase_accumulates() {
        let db = FakeDb::new().with_usage(UsageRecord {
            user_id: "alice".to_string(),
            is_subscribed: false,
            message_count: 0,
            free_quota: 0,
            paid_quota: 7,
        });
        let config = test_config();
        let event = checkout_event("alice", "price_credits");

        apply_webhook_event(&db, &config, &event).await.unwrap();
        assert_eq!(db.usage_for("alice").unwrap().paid_quota, 507);

        // A second delivery adds, never replaces.
        apply_webhook_event(&db, &config, &event).await.unwrap();
        assert_eq!(db.usage_for("alice").unwrap().paid_quota, 1007);
    }

    #[tokio::test]
    async fn test_recognized_but_unactionable_events_are_logged_only() {
        let db = FakeDb::new();
        let event = serde_json::json!({ "type": "invoice.paid" });
        let outcome = apply_webhook_event(&db, &test_config(), &event)
            .await
            .unwrap();
        assert_eq!(outcome.action, "logged");
    }

    #[tokio::test]
    async fn test_unknown_event_ignored() {
        let db = FakeDb::new();
        let event = serde_json::json!({ "type": "charge.refunded" });
        let outcome = apply_webhook_event(&db, &test_config(), &event)
            .await
            .unwrap();
        assert_eq!(outcome.action, "ignored");
    }

    #[tokio::test]
    async fn test_checkout_without_user_metadata_ignored() {
        let db = FakeDb::new();
        let event = serde_json::json!({
            "type": "checkout.session.completed",
            "data": { "object": { "metadata": {} } }
        });
        let outcome = apply_webhook_event(&db, &test_config(), &event)
            .await
            .unwrap();
        assert_eq!(outcome.action, "ignored");
        assert!(db.usage_for("alice").is_none());
    }
}

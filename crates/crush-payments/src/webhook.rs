//! Payment Webhook Handling
//!
//! Verifies provider callbacks over the raw body, then drives the single
//! `UNPAID → PAID` transition. Deliveries are at-least-once, so every path
//! here must be safe to run twice.

use std::sync::Arc;

use chrono::Utc;
use crush_core::EntitlementId;
use serde_json::Value;

use crate::error::{PaymentError, Result};
use crate::plan::{OwnerPlanStore, PlanUpgrade};
use crate::signature::{WebhookHeaders, WebhookVerifier};
use crate::store::{EntitlementStore, MarkPaid};

/// Event types that mean "the customer paid"
pub const SUCCESS_EVENT_TYPES: [&str; 5] = [
    "payment.succeeded",
    "payment.completed",
    "payment_intent.succeeded",
    "order.completed",
    "checkout.session.completed",
];

/// Metadata keys that may carry the entitlement id; `card_id` is the legacy name
const ENTITLEMENT_KEYS: [&str; 2] = ["entitlement_id", "card_id"];

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Successful payment for (possibly) one of our entitlements
    PaymentSucceeded {
        event_id: Option<String>,
        event_type: String,
        entitlement_id: Option<EntitlementId>,
    },

    /// Anything not on the allow-list; acknowledged and dropped
    Ignored {
        event_id: Option<String>,
        event_type: String,
    },
}

impl WebhookEvent {
    /// Parse a verified body. `delivery_id` comes from the envelope headers.
    pub fn parse(body: &[u8], delivery_id: Option<&str>) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;
        if !value.is_object() {
            return Err(PaymentError::WebhookParse("event is not a JSON object".into()));
        }

        let event_id = delivery_id
            .map(str::to_string)
            .or_else(|| value.get("id").and_then(Value::as_str).map(str::to_string));

        let event_type = value
            .get("event_type")
            .or_else(|| value.get("type"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if !SUCCESS_EVENT_TYPES.contains(&event_type.as_str()) || !settled(&value) {
            return Ok(Self::Ignored {
                event_id,
                event_type,
            });
        }

        let entitlement_id = find_entitlement_id(&value).and_then(|raw| {
            EntitlementId::parse(raw)
                .inspect_err(|e| tracing::warn!(error = %e, "Webhook carries malformed entitlement id"))
                .ok()
        });

        Ok(Self::PaymentSucceeded {
            event_id,
            event_type,
            entitlement_id,
        })
    }

    pub fn event_type(&self) -> &str {
        match self {
            Self::PaymentSucceeded { event_type, .. } | Self::Ignored { event_type, .. } => {
                event_type
            }
        }
    }

    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::PaymentSucceeded { event_id, .. } | Self::Ignored { event_id, .. } => {
                event_id.as_deref()
            }
        }
    }
}

/// Checkout completion events can precede settlement (async payment methods)
fn settled(value: &Value) -> bool {
    value
        .pointer("/data/object/payment_status")
        .and_then(Value::as_str)
        .is_none_or(|status| status == "paid")
}

fn find_entitlement_id(value: &Value) -> Option<&str> {
    ["/data/metadata", "/metadata", "/data/object/metadata"]
        .into_iter()
        .filter_map(|path| value.pointer(path))
        .find_map(|metadata| {
            ENTITLEMENT_KEYS
                .iter()
                .find_map(|key| metadata.get(key).and_then(Value::as_str))
        })
}

/// What the receiver did with a verified event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// This delivery flipped the entitlement to paid
    MarkedPaid {
        entitlement_id: EntitlementId,
        plan_upgraded: bool,
    },

    /// Redelivery; the entitlement was already paid
    AlreadyPaid { entitlement_id: EntitlementId },

    /// Success event without an entitlement id
    MissingEntitlement { event_type: String },

    /// Event type we do not act on
    Ignored { event_type: String },
}

/// Webhook receiver
pub struct WebhookReceiver<S: EntitlementStore + ?Sized> {
    store: Arc<S>,
    plans: Arc<dyn OwnerPlanStore>,
    verifier: WebhookVerifier,
}

impl<S: EntitlementStore + ?Sized> WebhookReceiver<S> {
    pub fn new(store: Arc<S>, plans: Arc<dyn OwnerPlanStore>, verifier: WebhookVerifier) -> Self {
        Self {
            store,
            plans,
            verifier,
        }
    }

    pub const fn verifier(&self) -> &WebhookVerifier {
        &self.verifier
    }

    /// Verify and process one delivery
    pub fn receive(&self, headers: &WebhookHeaders, body: &[u8]) -> Result<WebhookOutcome> {
        let event = self.parse_event(headers, body)?;
        self.handle(event)
    }

    /// Verify webhook signature and parse event
    pub fn parse_event(&self, headers: &WebhookHeaders, body: &[u8]) -> Result<WebhookEvent> {
        if !self.verifier.is_configured() {
            tracing::error!("Webhook rejected: no webhook secret configured");
            return Err(PaymentError::WebhookSignature(
                "webhook secret not configured".into(),
            ));
        }

        self.verifier.verify(headers, body).inspect_err(|e| {
            tracing::warn!(
                scheme = %self.verifier.scheme(),
                delivery_id = ?headers.delivery_id(),
                has_signature = headers.has_signature(),
                body_len = body.len(),
                error = %e,
                "Webhook signature rejected"
            );
        })?;

        WebhookEvent::parse(body, headers.delivery_id())
    }

    /// Process a verified event
    pub fn handle(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        tracing::info!(
            event_type = %event.event_type(),
            event_id = ?event.event_id(),
            "Processing payment webhook"
        );

        let (event_type, entitlement_id) = match event {
            WebhookEvent::Ignored { event_type, .. } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
                return Ok(WebhookOutcome::Ignored { event_type });
            }
            WebhookEvent::PaymentSucceeded {
                event_type,
                entitlement_id: None,
                ..
            } => {
                tracing::warn!(event_type = %event_type, "Payment event without entitlement id");
                return Ok(WebhookOutcome::MissingEntitlement { event_type });
            }
            WebhookEvent::PaymentSucceeded {
                event_type,
                entitlement_id: Some(id),
                ..
            } => (event_type, id),
        };

        let outcome = self.store.mark_paid(&entitlement_id, Utc::now()).inspect_err(|e| {
            tracing::error!(entitlement_id = %entitlement_id, error = %e, "Failed to mark entitlement paid");
        })?;

        match outcome {
            MarkPaid::Transitioned(record) => {
                tracing::info!(
                    entitlement_id = %entitlement_id,
                    event_type = %event_type,
                    tier = %record.pricing_tier,
                    "Entitlement marked paid"
                );

                let upgrade = PlanUpgrade {
                    owner_id: record.owner_id.clone(),
                    entitlement_id: entitlement_id.clone(),
                    tier: record.pricing_tier,
                    at: Utc::now(),
                };
                let plan_upgraded = match self.plans.apply_upgrade(&upgrade) {
                    Ok(plan) => {
                        tracing::info!(owner_id = %plan.owner_id, tier = %plan.tier, "Owner plan updated");
                        true
                    }
                    Err(e) => {
                        tracing::warn!(
                            entitlement_id = %entitlement_id,
                            error = %e,
                            "Owner plan update failed; payment still recorded"
                        );
                        false
                    }
                };

                Ok(WebhookOutcome::MarkedPaid {
                    entitlement_id,
                    plan_upgraded,
                })
            }

            MarkPaid::AlreadyPaid => {
                tracing::info!(entitlement_id = %entitlement_id, "Duplicate delivery; already paid");
                Ok(WebhookOutcome::AlreadyPaid { entitlement_id })
            }

            // Possibly a webhook racing the insert; the provider will redeliver
            MarkPaid::NotFound => {
                tracing::warn!(entitlement_id = %entitlement_id, "Webhook for unknown entitlement");
                Err(PaymentError::NotFound(entitlement_id.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{MemoryOwnerPlanStore, OwnerPlan};
    use crate::signature::{HEADER_WEBHOOK_SIGNATURE, SignatureScheme, sign};
    use crate::store::MemoryEntitlementStore;
    use chrono::DateTime;
    use crush_core::{
        ArtifactPayload, CardPayload, Draft, EntitlementRecord, OwnerId, PricingTier,
    };

    const SECRET: &str = "whsec_dGVzdC1zZWNyZXQtZm9yLWNydXNoY2FyZHM=";

    struct Fixture {
        store: Arc<MemoryEntitlementStore>,
        plans: Arc<MemoryOwnerPlanStore>,
        receiver: WebhookReceiver<MemoryEntitlementStore>,
        record: EntitlementRecord,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryEntitlementStore::new());
        let plans = Arc::new(MemoryOwnerPlanStore::new());
        let verifier =
            WebhookVerifier::new(SignatureScheme::StandardWebhooks, Some(SECRET)).unwrap();
        let receiver = WebhookReceiver::new(store.clone(), plans.clone(), verifier);

        let record = EntitlementRecord::from_draft(
            OwnerId::from_string("alice"),
            Draft::new(ArtifactPayload::Card(CardPayload::default()), PricingTier::Premium),
        );
        store.insert(&record).unwrap();

        Fixture {
            store,
            plans,
            receiver,
            record,
        }
    }

    fn event_body(event_type: &str, id: &str) -> Vec<u8> {
        serde_json::json!({
            "type": event_type,
            "data": { "metadata": { "entitlement_id": id } }
        })
        .to_string()
        .into_bytes()
    }

    fn signed(body: &[u8]) -> WebhookHeaders {
        sign(
            SignatureScheme::StandardWebhooks,
            SECRET,
            "msg_1",
            Utc::now().timestamp(),
            body,
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_delivery_is_idempotent() {
        let fx = fixture();
        let body = event_body("payment.completed", fx.record.id.as_str());
        let headers = signed(&body);

        let first = fx.receiver.receive(&headers, &body).unwrap();
        assert_eq!(
            first,
            WebhookOutcome::MarkedPaid {
                entitlement_id: fx.record.id.clone(),
                plan_upgraded: true,
            }
        );

        let second = fx.receiver.receive(&headers, &body).unwrap();
        assert_eq!(
            second,
            WebhookOutcome::AlreadyPaid {
                entitlement_id: fx.record.id.clone()
            }
        );

        assert!(fx.store.get(&fx.record.id).unwrap().unwrap().is_paid());
        let plan = fx.plans.get(&fx.record.owner_id).unwrap().unwrap();
        assert_eq!(plan.upgrades.len(), 1);
        assert_eq!(plan.tier, PricingTier::Premium);
    }

    #[test]
    fn test_altered_signature_leaves_record_unpaid() {
        let fx = fixture();
        let body = event_body("payment.completed", fx.record.id.as_str());
        let headers = signed(&body);

        let sig = headers.get(HEADER_WEBHOOK_SIGNATURE).unwrap();
        let mut bytes = sig.as_bytes().to_vec();
        let last = bytes.len() - 2;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        let altered = headers
            .clone()
            .with(HEADER_WEBHOOK_SIGNATURE, String::from_utf8(bytes).unwrap());

        assert!(matches!(
            fx.receiver.receive(&altered, &body),
            Err(PaymentError::WebhookSignature(_))
        ));
        assert!(!fx.store.get(&fx.record.id).unwrap().unwrap().is_paid());
    }

    #[test]
    fn test_tampered_body_leaves_record_unpaid() {
        let fx = fixture();
        let body = event_body("payment.failed", fx.record.id.as_str());
        let headers = signed(&body);
        let forged = event_body("payment.completed", fx.record.id.as_str());

        assert!(fx.receiver.receive(&headers, &forged).is_err());
        assert!(!fx.store.get(&fx.record.id).unwrap().unwrap().is_paid());
    }

    #[test]
    fn test_unconfigured_secret_rejects_everything() {
        let fx = fixture();
        let receiver = WebhookReceiver::new(
            fx.store.clone(),
            fx.plans.clone(),
            WebhookVerifier::new(SignatureScheme::StandardWebhooks, None).unwrap(),
        );
        let body = event_body("payment.completed", fx.record.id.as_str());

        assert!(matches!(
            receiver.receive(&signed(&body), &body),
            Err(PaymentError::WebhookSignature(_))
        ));
        assert!(!fx.store.get(&fx.record.id).unwrap().unwrap().is_paid());
    }

    #[test]
    fn test_unknown_entitlement_is_retryable() {
        let fx = fixture();
        let body = event_body("payment.completed", "E99");

        let err = fx.receiver.receive(&signed(&body), &body).unwrap_err();
        assert!(matches!(err, PaymentError::NotFound(_)));
        assert!(err.is_retryable());
        assert!(fx.store.get(&EntitlementId::parse("E99").unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_unknown_event_type_acknowledged() {
        let fx = fixture();
        let body = event_body("subscription.renewed", fx.record.id.as_str());

        let outcome = fx.receiver.receive(&signed(&body), &body).unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Ignored {
                event_type: "subscription.renewed".into()
            }
        );
        assert!(!fx.store.get(&fx.record.id).unwrap().unwrap().is_paid());
    }

    #[test]
    fn test_success_without_metadata_acknowledged() {
        let fx = fixture();
        let body = br#"{"event_type":"payment.succeeded","data":{}}"#;

        let outcome = fx.receiver.receive(&signed(body), body).unwrap();
        assert!(matches!(outcome, WebhookOutcome::MissingEntitlement { .. }));
    }

    #[test]
    fn test_malformed_verified_body() {
        let fx = fixture();
        let body = b"[1,2,3";
        assert!(matches!(
            fx.receiver.receive(&signed(body), body),
            Err(PaymentError::WebhookParse(_))
        ));
    }

    #[test]
    fn test_event_shape_variants() {
        let id = "abc123";

        let dodo = format!(
            r#"{{"business_id":"b","type":"payment.succeeded","data":{{"metadata":{{"entitlement_id":"{id}"}}}}}}"#
        );
        let legacy = format!(r#"{{"event_type":"order.completed","metadata":{{"card_id":"{id}"}}}}"#);
        let stripe = format!(
            r#"{{"id":"evt_1","type":"checkout.session.completed","data":{{"object":{{"payment_status":"paid","metadata":{{"entitlement_id":"{id}"}}}}}}}}"#
        );

        for body in [dodo, legacy, stripe] {
            match WebhookEvent::parse(body.as_bytes(), None).unwrap() {
                WebhookEvent::PaymentSucceeded { entitlement_id, .. } => {
                    assert_eq!(entitlement_id.unwrap().as_str(), id);
                }
                other => panic!("expected payment event, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_unsettled_checkout_ignored() {
        let body = br#"{"type":"checkout.session.completed","data":{"object":{"payment_status":"unpaid","metadata":{"entitlement_id":"E1"}}}}"#;
        assert!(matches!(
            WebhookEvent::parse(body, None).unwrap(),
            WebhookEvent::Ignored { .. }
        ));
    }

    #[test]
    fn test_delivery_id_preferred_over_body_id() {
        let body = br#"{"id":"evt_body","type":"payment.completed"}"#;
        let event = WebhookEvent::parse(body, Some("msg_header")).unwrap();
        assert_eq!(event.event_id(), Some("msg_header"));
        assert_eq!(
            WebhookEvent::parse(body, None).unwrap().event_id(),
            Some("evt_body")
        );
    }

    #[test]
    fn test_concurrent_duplicates_upgrade_once() {
        let fx = fixture();
        let receiver = Arc::new(fx.receiver);
        let body = event_body("payment.completed", fx.record.id.as_str());
        let headers = signed(&body);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let receiver = receiver.clone();
                let body = body.clone();
                let headers = headers.clone();
                std::thread::spawn(move || receiver.receive(&headers, &body).unwrap())
            })
            .collect();

        let marked = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| matches!(o, WebhookOutcome::MarkedPaid { .. }))
            .count();

        assert_eq!(marked, 1);
        assert_eq!(
            fx.plans.get(&fx.record.owner_id).unwrap().unwrap().upgrades.len(),
            1
        );
    }

    struct BrokenPlans;

    impl OwnerPlanStore for BrokenPlans {
        fn apply_upgrade(&self, _upgrade: &PlanUpgrade) -> Result<OwnerPlan> {
            Err(PaymentError::Storage("plans offline".into()))
        }

        fn get(&self, _owner: &OwnerId) -> Result<Option<OwnerPlan>> {
            Ok(None)
        }
    }

    #[test]
    fn test_plan_failure_does_not_block_payment() {
        let fx = fixture();
        let receiver = WebhookReceiver::new(
            fx.store.clone(),
            Arc::new(BrokenPlans),
            WebhookVerifier::new(SignatureScheme::StandardWebhooks, Some(SECRET)).unwrap(),
        );
        let body = event_body("payment.completed", fx.record.id.as_str());

        let outcome = receiver.receive(&signed(&body), &body).unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::MarkedPaid {
                entitlement_id: fx.record.id.clone(),
                plan_upgraded: false,
            }
        );
        assert!(fx.store.get(&fx.record.id).unwrap().unwrap().is_paid());
    }

    struct BrokenStore;

    impl EntitlementStore for BrokenStore {
        fn insert(&self, _record: &EntitlementRecord) -> Result<()> {
            Err(PaymentError::Storage("db down".into()))
        }

        fn get(&self, _id: &EntitlementId) -> Result<Option<EntitlementRecord>> {
            Err(PaymentError::Storage("db down".into()))
        }

        fn mark_paid(&self, _id: &EntitlementId, _at: DateTime<Utc>) -> Result<MarkPaid> {
            Err(PaymentError::Storage("db down".into()))
        }

        fn list_by_owner(&self, _owner: &OwnerId) -> Result<Vec<EntitlementRecord>> {
            Err(PaymentError::Storage("db down".into()))
        }
    }

    #[test]
    fn test_storage_failure_is_retryable() {
        let receiver = WebhookReceiver::new(
            Arc::new(BrokenStore),
            Arc::new(MemoryOwnerPlanStore::new()),
            WebhookVerifier::new(SignatureScheme::StandardWebhooks, Some(SECRET)).unwrap(),
        );
        let body = event_body("payment.completed", "E1");

        let err = receiver.receive(&signed(&body), &body).unwrap_err();
        assert!(matches!(err, PaymentError::Storage(_)));
        assert!(err.is_retryable());
    }
}

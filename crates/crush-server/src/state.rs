//! Application State

use std::sync::Arc;

use anyhow::Context;
use crush_payments::{
    CheckoutService, DodoProvider, EntitlementStore, FileEntitlementStore, MemoryEntitlementStore,
    MemoryOwnerPlanStore, MockPaymentProvider, OwnerPlanStore, PaymentProvider, StripeProvider,
    WebhookReceiver, WebhookVerifier,
};

use crate::auth::SessionTokens;
use crate::config::{ProviderKind, ServerConfig};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Durable entitlement records
    pub store: Arc<dyn EntitlementStore>,

    /// Owner plan tier, upgraded on first payment
    pub plans: Arc<dyn OwnerPlanStore>,

    /// Checkout service (None if the provider is not configured)
    pub checkout: Option<Arc<CheckoutService<dyn EntitlementStore>>>,

    pub webhooks: Arc<WebhookReceiver<dyn EntitlementStore>>,

    pub sessions: Arc<SessionTokens>,

    /// Provider name for health output
    pub provider: &'static str,
}

impl AppState {
    /// Wire stores, provider and verifier from configuration
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn EntitlementStore> = match &config.data_path {
            Some(path) => {
                let store = FileEntitlementStore::open(path)
                    .with_context(|| format!("opening entitlement store {}", path.display()))?;
                tracing::info!("✓ Entitlements persisted to {}", path.display());
                Arc::new(store)
            }
            None => {
                tracing::warn!("⚠ DATA_PATH not set - entitlements kept in memory only");
                Arc::new(MemoryEntitlementStore::new())
            }
        };
        let plans: Arc<dyn OwnerPlanStore> = Arc::new(MemoryOwnerPlanStore::new());

        let checkout = match provider_from_config(config)? {
            Some(provider) => {
                tracing::info!("✓ Payments configured ({})", provider.name());
                for tier in config.catalog.missing_tiers() {
                    tracing::warn!("⚠ No product configured for {tier} tier");
                }
                let mut service =
                    CheckoutService::new(Arc::clone(&store), provider, config.catalog.clone());
                if let Some(base) = &config.public_base_url {
                    service = service.with_return_origin(base.clone());
                }
                Some(Arc::new(service))
            }
            None => {
                tracing::warn!("⚠ Payments not configured - checkout disabled");
                tracing::warn!("  Set PAYMENT_API_KEY and PRODUCT_ID_BASIC in .env");
                None
            }
        };

        let verifier =
            WebhookVerifier::new(config.signature_scheme, config.webhook_secret.as_deref())
                .context("webhook verifier")?
                .with_tolerance(config.webhook_tolerance);
        if verifier.is_configured() {
            tracing::info!("✓ Webhook signatures verified ({})", verifier.scheme());
        } else {
            tracing::warn!("⚠ WEBHOOK_SECRET not set - every webhook will be rejected");
        }
        let webhooks = WebhookReceiver::new(Arc::clone(&store), Arc::clone(&plans), verifier);

        let sessions = SessionTokens::new(&config.session_secret)
            .map_err(|e| anyhow::anyhow!("session secret: {e}"))?;

        Ok(Self {
            store,
            plans,
            checkout,
            webhooks: Arc::new(webhooks),
            sessions: Arc::new(sessions),
            provider: config.provider.as_str(),
        })
    }
}

fn provider_from_config(config: &ServerConfig) -> anyhow::Result<Option<Arc<dyn PaymentProvider>>> {
    let provider: Arc<dyn PaymentProvider> = match (config.provider, &config.api_key) {
        (ProviderKind::Mock, _) => Arc::new(MockPaymentProvider::new()),
        (_, None) => return Ok(None),
        (ProviderKind::Dodo, Some(key)) => {
            Arc::new(DodoProvider::new(key.clone(), config.live_mode).context("dodo client")?)
        }
        (ProviderKind::Stripe, Some(key)) => Arc::new(StripeProvider::new(key)),
    };
    Ok(Some(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crush_core::{ArtifactPayload, Draft, OwnerId, PricingTier, VoicePayload};

    fn config(pairs: &[(&str, String)]) -> ServerConfig {
        ServerConfig::from_lookup(|key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    #[test]
    fn test_payments_disabled_without_api_key() {
        let state = AppState::from_config(&config(&[
            ("SESSION_SECRET", "s".into()),
            ("WEBHOOK_SECRET", "whsec_b3RoZXItc2VjcmV0".into()),
        ]))
        .unwrap();
        assert!(state.checkout.is_none());
        assert!(state.webhooks.verifier().is_configured());
        assert_eq!(state.provider, "dodo");
    }

    #[test]
    fn test_mock_provider_with_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entitlements.json");
        let cfg = config(&[
            ("SESSION_SECRET", "s".into()),
            ("PAYMENT_PROVIDER", "mock".into()),
            ("DATA_PATH", path.display().to_string()),
        ]);

        let state = AppState::from_config(&cfg).unwrap();
        assert!(state.checkout.is_some());
        assert!(!state.webhooks.verifier().is_configured());

        let draft = Draft::new(
            ArtifactPayload::Voice(VoicePayload {
                voice_note_url: "https://cdn.example/n.webm".into(),
                background_image_url: None,
                duration_secs: 9,
            }),
            PricingTier::Premium,
        );
        let record =
            crush_payments::stage_entitlement(state.store.as_ref(), &OwnerId::from_string("o"), draft)
                .unwrap();
        assert!(path.exists());

        let reopened = AppState::from_config(&cfg).unwrap();
        assert!(reopened.store.get(&record.id).unwrap().is_some());
    }
}

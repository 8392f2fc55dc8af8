//! Server Configuration
//!
//! Everything operator-controlled comes from the environment. Tier → product
//! mapping lives here, never in client input.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use crush_core::PricingTier;
use crush_payments::{SignatureScheme, TierCatalog};
use url::Url;

/// Which hosted-checkout provider to talk to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    Dodo,
    Stripe,
    Mock,
}

impl ProviderKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dodo => "dodo",
            Self::Stripe => "stripe",
            Self::Mock => "mock",
        }
    }

    /// Signature scheme the provider signs webhooks with
    pub const fn default_scheme(self) -> SignatureScheme {
        match self {
            Self::Dodo | Self::Mock => SignatureScheme::StandardWebhooks,
            Self::Stripe => SignatureScheme::Stripe,
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dodo" => Ok(Self::Dodo),
            "stripe" => Ok(Self::Stripe),
            "mock" => Ok(Self::Mock),
            other => bail!("unknown PAYMENT_PROVIDER {other}"),
        }
    }
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,

    pub provider: ProviderKind,

    /// Provider API key; payments are disabled without it
    pub api_key: Option<String>,

    pub live_mode: bool,

    pub catalog: TierCatalog,

    /// Webhook shared secret; every webhook is rejected without it
    pub webhook_secret: Option<String>,

    pub signature_scheme: SignatureScheme,

    pub webhook_tolerance: Duration,

    /// Key for owner session tokens
    pub session_secret: String,

    /// Pin return URLs to this origin
    pub public_base_url: Option<Url>,

    /// JSON store file; in-memory when unset
    pub data_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Create from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from any key → value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider: ProviderKind = get("PAYMENT_PROVIDER")
            .as_deref()
            .unwrap_or("dodo")
            .parse()?;

        let signature_scheme = match get("WEBHOOK_SIGNATURE_SCHEME") {
            Some(s) => s.parse::<SignatureScheme>().context("WEBHOOK_SIGNATURE_SCHEME")?,
            None => provider.default_scheme(),
        };

        let webhook_tolerance = match get("WEBHOOK_TOLERANCE_SECS") {
            Some(s) => Duration::from_secs(s.parse::<u64>().context("WEBHOOK_TOLERANCE_SECS")?),
            None => crush_payments::signature::DEFAULT_TOLERANCE,
        };

        let live_mode = get("PAYMENT_LIVE_MODE")
            .is_some_and(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "live"));

        let mut catalog = TierCatalog::new();
        for (tier, key) in [
            (PricingTier::Basic, "PRODUCT_ID_BASIC"),
            (PricingTier::Premium, "PRODUCT_ID_PREMIUM"),
        ] {
            if let Some(product) = get(key) {
                catalog = catalog.with_product(tier, product);
            }
        }

        let session_secret = get("SESSION_SECRET").context("SESSION_SECRET not set")?;

        let public_base_url = get("PUBLIC_BASE_URL")
            .map(|raw| Url::parse(&raw).with_context(|| format!("PUBLIC_BASE_URL {raw}")))
            .transpose()?;

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            provider,
            api_key: get("PAYMENT_API_KEY"),
            live_mode,
            catalog,
            webhook_secret: get("WEBHOOK_SECRET"),
            signature_scheme,
            webhook_tolerance,
            session_secret,
            public_base_url,
            data_path: get("DATA_PATH").map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("SESSION_SECRET", "s3cret")]).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:3000");
        assert_eq!(cfg.provider, ProviderKind::Dodo);
        assert_eq!(cfg.signature_scheme, SignatureScheme::StandardWebhooks);
        assert!(!cfg.live_mode);
        assert!(cfg.api_key.is_none());
        assert!(cfg.webhook_secret.is_none());
        assert_eq!(cfg.catalog.missing_tiers().len(), 2);
    }

    #[test]
    fn test_stripe_defaults_to_stripe_signatures() {
        let cfg = config(&[
            ("SESSION_SECRET", "s3cret"),
            ("PAYMENT_PROVIDER", "Stripe"),
            ("PRODUCT_ID_BASIC", "price_basic"),
            ("PAYMENT_LIVE_MODE", "true"),
        ])
        .unwrap();
        assert_eq!(cfg.signature_scheme, SignatureScheme::Stripe);
        assert!(cfg.live_mode);
        assert_eq!(cfg.catalog.product_for(PricingTier::Basic).unwrap(), "price_basic");
        assert!(cfg.catalog.product_for(PricingTier::Premium).is_err());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(config(&[]).is_err());
        assert!(config(&[("SESSION_SECRET", "s"), ("PAYMENT_PROVIDER", "paypal")]).is_err());
        assert!(config(&[("SESSION_SECRET", "s"), ("WEBHOOK_SIGNATURE_SCHEME", "md5")]).is_err());
        assert!(config(&[("SESSION_SECRET", "s"), ("PUBLIC_BASE_URL", "not a url")]).is_err());
    }
}

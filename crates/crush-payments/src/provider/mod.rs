//! Payment Providers
//!
//! Abstractions over hosted-checkout payment providers. The provider owns the
//! checkout session; we only hand it a product, a return URL and the
//! entitlement id as metadata, and learn the outcome from its webhook.

mod dodo;
mod mock;
mod stripe;

pub use self::dodo::DodoProvider;
pub use self::mock::MockPaymentProvider;
pub use self::stripe::StripeProvider;

use async_trait::async_trait;
use crush_core::{EntitlementId, PricingTier};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Metadata key carrying the entitlement id through the provider
pub const ENTITLEMENT_METADATA_KEY: &str = "entitlement_id";

/// What we ask the provider to sell
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSessionRequest {
    /// Provider-side product (or price) id for the tier
    pub product_id: String,

    /// Correlation key, sent as metadata
    pub entitlement_id: EntitlementId,

    pub tier: PricingTier,

    /// Where the provider sends the browser afterwards
    pub success_url: String,

    #[serde(default)]
    pub customer_email: Option<String>,
}

/// Provider-minted session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSession {
    /// Provider session/payment id
    pub session_id: String,

    /// Hosted page to redirect the browser to
    pub checkout_url: String,
}

/// Payment provider trait (Strategy pattern)
///
/// Implement this for each hosted-checkout provider.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted checkout session
    async fn create_session(&self, request: &ProviderSessionRequest) -> Result<ProviderSession>;

    /// Provider name
    fn name(&self) -> &str;
}

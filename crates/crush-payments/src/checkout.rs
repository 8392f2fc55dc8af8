//! Checkout Sessions
//!
//! Stages drafts as unpaid entitlements and asks the payment provider for a
//! hosted checkout page. Nothing here marks anything paid.

use std::collections::HashMap;
use std::sync::Arc;

use crush_core::{Draft, EntitlementId, EntitlementRecord, OwnerId, PricingTier};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PaymentError, Result};
use crate::provider::{PaymentProvider, ProviderSessionRequest};
use crate::store::EntitlementStore;

/// Query parameter the confirmation page resumes from
pub const RETURN_ID_PARAM: &str = "entitlement_id";

/// Server-side tier → provider product mapping
#[derive(Clone, Debug, Default)]
pub struct TierCatalog {
    products: HashMap<PricingTier, String>,
}

impl TierCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_product(mut self, tier: PricingTier, product_id: impl Into<String>) -> Self {
        self.products.insert(tier, product_id.into());
        self
    }

    /// Provider product id for a tier
    pub fn product_for(&self, tier: PricingTier) -> Result<&str> {
        self.products
            .get(&tier)
            .map(String::as_str)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| PaymentError::Config(format!("no product id configured for tier {tier}")))
    }

    /// Tiers without a product mapping
    pub fn missing_tiers(&self) -> Vec<PricingTier> {
        PricingTier::ALL
            .into_iter()
            .filter(|t| self.product_for(*t).is_err())
            .collect()
    }
}

/// Request to create a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Unpaid entitlement owned by the caller
    pub entitlement_id: EntitlementId,

    /// Tier to purchase; must match the staged one
    pub tier: PricingTier,

    /// Where the provider redirects after payment
    pub return_url: String,
}

/// Result of creating a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    /// Provider session id
    pub session_id: String,

    /// URL to redirect user to
    pub checkout_url: String,

    pub entitlement_id: EntitlementId,

    pub tier: PricingTier,
}

/// Validate a draft and insert it as an unpaid entitlement
pub fn stage_entitlement<S: EntitlementStore + ?Sized>(
    store: &S,
    owner: &OwnerId,
    draft: Draft,
) -> Result<EntitlementRecord> {
    draft.validate()?;

    let record = EntitlementRecord::from_draft(owner.clone(), draft);
    store.insert(&record)?;

    tracing::info!(
        entitlement_id = %record.id,
        owner_id = %owner,
        kind = %record.artifact_kind,
        tier = %record.pricing_tier,
        "Staged unpaid entitlement"
    );

    Ok(record)
}

/// Checkout service
pub struct CheckoutService<S: EntitlementStore + ?Sized> {
    store: Arc<S>,
    provider: Arc<dyn PaymentProvider>,
    catalog: TierCatalog,
    return_origin: Option<Url>,
}

impl<S: EntitlementStore + ?Sized> CheckoutService<S> {
    pub fn new(store: Arc<S>, provider: Arc<dyn PaymentProvider>, catalog: TierCatalog) -> Self {
        Self {
            store,
            provider,
            catalog,
            return_origin: None,
        }
    }

    /// Only accept return URLs on this origin
    #[must_use]
    pub fn with_return_origin(mut self, base: Url) -> Self {
        self.return_origin = Some(base);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub const fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    /// Validate a draft and store it as an unpaid entitlement
    pub fn stage_entitlement(&self, owner: &OwnerId, draft: Draft) -> Result<EntitlementRecord> {
        stage_entitlement(self.store.as_ref(), owner, draft)
    }

    /// Create a hosted checkout session for an unpaid entitlement
    pub async fn create_checkout_session(
        &self,
        owner: &OwnerId,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession> {
        let id = &request.entitlement_id;

        // Foreign records look exactly like missing ones
        let record = self
            .store
            .get(id)?
            .filter(|r| &r.owner_id == owner)
            .ok_or_else(|| PaymentError::NotFound(id.to_string()))?;

        if record.is_paid() {
            return Err(PaymentError::AlreadyPaid(id.to_string()));
        }

        if record.pricing_tier != request.tier {
            return Err(PaymentError::TierMismatch {
                requested: request.tier.to_string(),
                staged: record.pricing_tier.to_string(),
            });
        }

        let product_id = self.catalog.product_for(request.tier).inspect_err(|e| {
            tracing::error!(tier = %request.tier, error = %e, "Checkout misconfigured");
        })?;

        let success_url = self.resolve_return_url(&request.return_url, id)?;

        let provider_request = ProviderSessionRequest {
            product_id: product_id.to_string(),
            entitlement_id: id.clone(),
            tier: request.tier,
            success_url,
            customer_email: None,
        };

        let session = self
            .provider
            .create_session(&provider_request)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    entitlement_id = %id,
                    provider = self.provider.name(),
                    error = %e,
                    "Checkout session creation failed"
                );
            })?;

        tracing::info!(
            entitlement_id = %id,
            session_id = %session.session_id,
            provider = self.provider.name(),
            "Created checkout session"
        );

        Ok(CheckoutSession {
            session_id: session.session_id,
            checkout_url: session.checkout_url,
            entitlement_id: id.clone(),
            tier: request.tier,
        })
    }

    /// Ensure the return URL is acceptable and carries the entitlement id
    fn resolve_return_url(&self, raw: &str, id: &EntitlementId) -> Result<String> {
        let mut url =
            Url::parse(raw).map_err(|e| PaymentError::InvalidReturnUrl(format!("{raw}: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(PaymentError::InvalidReturnUrl(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }

        if let Some(base) = &self.return_origin {
            if url.origin() != base.origin() {
                return Err(PaymentError::InvalidReturnUrl(format!(
                    "origin {} is not allowed",
                    url.origin().ascii_serialization()
                )));
            }
        }

        let existing: Vec<String> = url
            .query_pairs()
            .filter(|(k, _)| k == RETURN_ID_PARAM)
            .map(|(_, v)| v.into_owned())
            .collect();

        match existing.as_slice() {
            [] => {
                url.query_pairs_mut().append_pair(RETURN_ID_PARAM, id.as_str());
            }
            [only] if only == id.as_str() => {}
            _ => {
                return Err(PaymentError::InvalidReturnUrl(format!(
                    "{RETURN_ID_PARAM} does not match the entitlement"
                )));
            }
        }

        Ok(url.into())
    }
}

//! Checkout Flow
//!
//! ```text
//! DraftStore ──take──▶ POST /api/entitlements ──▶ POST /api/checkout ──▶ redirect
//!                               │                        │ fails
//!                               ▼                        ▼
//!                        unpaid entitlement ◀── retry_checkout (same id)
//! ```

use std::sync::Arc;

use url::Url;

use crush_core::{ArtifactKind, DraftId, EntitlementId};

use crate::api::{CheckoutApi, StagedEntitlement};
use crate::drafts::DraftStore;
use crate::error::{ClientError, Result};

/// Query parameter carrying the entitlement id on the success page
pub const RETURN_ID_PARAM: &str = "entitlement_id";

/// Query parameter carrying the artifact kind on the success page
pub const RETURN_KIND_PARAM: &str = "kind";

const SUCCESS_PATH: &str = "success";

/// Where to send the browser next
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutRedirect {
    pub entitlement_id: EntitlementId,

    /// Provider-hosted payment page
    pub checkout_url: String,

    /// Page the provider returns to after payment
    pub return_url: Url,
}

/// Entitlement id and kind read back from the success page URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReturnParams {
    pub entitlement_id: EntitlementId,
    pub kind: Option<ArtifactKind>,
}

impl ReturnParams {
    /// `None` when the URL has no usable entitlement id
    pub fn from_url(raw: &str) -> Option<Self> {
        let url = Url::parse(raw).ok()?;
        let mut entitlement_id = None;
        let mut kind = None;
        for (key, value) in url.query_pairs() {
            match &*key {
                RETURN_ID_PARAM => entitlement_id = EntitlementId::parse(&value).ok(),
                RETURN_KIND_PARAM => kind = value.parse().ok(),
                _ => {}
            }
        }
        Some(Self {
            entitlement_id: entitlement_id?,
            kind,
        })
    }
}

/// Drives a draft through entitlement creation and hosted checkout
pub struct CheckoutFlow<A: CheckoutApi + ?Sized> {
    api: Arc<A>,
    drafts: Arc<DraftStore>,
    origin: Url,
}

impl<A: CheckoutApi + ?Sized> CheckoutFlow<A> {
    pub fn new(api: Arc<A>, drafts: Arc<DraftStore>, origin: &str) -> Result<Self> {
        let origin =
            Url::parse(origin).map_err(|e| ClientError::InvalidUrl(format!("{origin}: {e}")))?;
        Ok(Self {
            api,
            drafts,
            origin,
        })
    }

    pub fn drafts(&self) -> &DraftStore {
        &self.drafts
    }

    /// `{origin}/success?entitlement_id=<id>&kind=<kind>`
    pub fn return_url(&self, id: &EntitlementId, kind: ArtifactKind) -> Result<Url> {
        let mut url = self
            .origin
            .join(SUCCESS_PATH)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair(RETURN_ID_PARAM, id.as_str())
            .append_pair(RETURN_KIND_PARAM, kind.as_str());
        Ok(url)
    }

    /// Consume a draft, create its entitlement and open checkout
    ///
    /// If the entitlement is created but checkout fails, the error is
    /// [`ClientError::CheckoutFailed`] and carries the staged entitlement so
    /// [`Self::retry_checkout`] can reuse it.
    pub async fn begin(&self, draft_id: DraftId) -> Result<CheckoutRedirect> {
        let draft = self.drafts.take(draft_id)?;

        let staged = match self.api.create_entitlement(&draft).await {
            Ok(staged) => staged,
            Err(e) => {
                // Nothing was created server-side; keep the draft for another try
                self.drafts.restore(draft_id, draft);
                tracing::warn!(draft_id = %draft_id, error = %e, "Entitlement creation failed");
                return Err(e);
            }
        };

        tracing::info!(
            draft_id = %draft_id,
            entitlement_id = %staged.entitlement_id,
            "Entitlement created"
        );

        self.open_checkout(&staged).await.map_err(|e| {
            tracing::warn!(
                entitlement_id = %staged.entitlement_id,
                error = %e,
                "Checkout creation failed"
            );
            ClientError::CheckoutFailed {
                staged: staged.clone(),
                source: Box::new(e),
            }
        })
    }

    /// Retry checkout for an entitlement that already exists
    pub async fn retry_checkout(&self, staged: &StagedEntitlement) -> Result<CheckoutRedirect> {
        self.open_checkout(staged).await
    }

    async fn open_checkout(&self, staged: &StagedEntitlement) -> Result<CheckoutRedirect> {
        let return_url = self.return_url(&staged.entitlement_id, staged.artifact_kind)?;
        let checkout_url = self
            .api
            .create_checkout(&staged.entitlement_id, staged.pricing_tier, &return_url)
            .await?;

        Ok(CheckoutRedirect {
            entitlement_id: staged.entitlement_id.clone(),
            checkout_url,
            return_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use crush_core::{ArtifactPayload, BouquetPayload, Draft, PricingTier};

    #[derive(Default)]
    struct FakeApi {
        created: AtomicUsize,
        fail_create: AtomicBool,
        fail_checkout: AtomicBool,
        checkouts: Mutex<Vec<(EntitlementId, PricingTier, String)>>,
    }

    #[async_trait]
    impl CheckoutApi for FakeApi {
        async fn create_entitlement(&self, draft: &Draft) -> Result<StagedEntitlement> {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(ClientError::Api {
                    status: 500,
                    code: "STORAGE_ERROR".into(),
                    message: "try again".into(),
                });
            }
            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(StagedEntitlement {
                entitlement_id: EntitlementId::parse(&format!("E{n}")).unwrap(),
                artifact_kind: draft.artifact_kind(),
                pricing_tier: draft.pricing_tier,
            })
        }

        async fn create_checkout(
            &self,
            entitlement_id: &EntitlementId,
            tier: PricingTier,
            return_url: &Url,
        ) -> Result<String> {
            if self.fail_checkout.load(Ordering::SeqCst) {
                return Err(ClientError::Api {
                    status: 502,
                    code: "PROVIDER_ERROR".into(),
                    message: "Payment processing failed. Please try again.".into(),
                });
            }
            self.checkouts.lock().unwrap().push((
                entitlement_id.clone(),
                tier,
                return_url.to_string(),
            ));
            Ok("https://pay.example/session/1".into())
        }
    }

    fn flow(api: &Arc<FakeApi>) -> (CheckoutFlow<FakeApi>, DraftId) {
        let drafts = Arc::new(DraftStore::new());
        let draft = Draft::new(
            ArtifactPayload::Bouquet(BouquetPayload {
                flowers: vec!["sunflower".into()],
                ..BouquetPayload::default()
            }),
            PricingTier::Premium,
        );
        let id = drafts.stage(draft).unwrap();
        let flow = CheckoutFlow::new(Arc::clone(api), drafts, "https://crush.example").unwrap();
        (flow, id)
    }

    #[tokio::test]
    async fn test_begin_redirects_with_return_url() {
        let api = Arc::new(FakeApi::default());
        let (flow, draft_id) = flow(&api);

        let redirect = flow.begin(draft_id).await.unwrap();
        assert_eq!(redirect.checkout_url, "https://pay.example/session/1");
        assert_eq!(
            redirect.return_url.as_str(),
            "https://crush.example/success?entitlement_id=E1&kind=bouquet"
        );

        let checkouts = api.checkouts.lock().unwrap();
        assert_eq!(checkouts.len(), 1);
        assert_eq!(checkouts[0].1, PricingTier::Premium);

        // Draft was consumed
        assert!(flow.drafts().is_empty());
    }

    #[tokio::test]
    async fn test_second_begin_fails() {
        let api = Arc::new(FakeApi::default());
        let (flow, draft_id) = flow(&api);

        flow.begin(draft_id).await.unwrap();
        assert!(matches!(
            flow.begin(draft_id).await,
            Err(ClientError::DraftNotFound(_))
        ));
        assert_eq!(api.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_checkout_failure_reuses_entitlement_on_retry() {
        let api = Arc::new(FakeApi::default());
        let (flow, draft_id) = flow(&api);

        api.fail_checkout.store(true, Ordering::SeqCst);
        let err = flow.begin(draft_id).await.unwrap_err();
        let staged = err.retry_entitlement().cloned().unwrap();
        assert_eq!(staged.entitlement_id.as_str(), "E1");
        assert_eq!(
            err.user_message(),
            "Payment processing failed. Please try again."
        );

        api.fail_checkout.store(false, Ordering::SeqCst);
        let redirect = flow.retry_checkout(&staged).await.unwrap();
        assert_eq!(redirect.entitlement_id, staged.entitlement_id);

        // No second entitlement was created
        assert_eq!(api.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_create_failure_keeps_draft() {
        let api = Arc::new(FakeApi::default());
        let (flow, draft_id) = flow(&api);

        api.fail_create.store(true, Ordering::SeqCst);
        let err = flow.begin(draft_id).await.unwrap_err();
        assert!(err.retry_entitlement().is_none());
        assert!(flow.drafts().get(draft_id).is_some());

        api.fail_create.store(false, Ordering::SeqCst);
        assert!(flow.begin(draft_id).await.is_ok());
    }

    #[test]
    fn test_return_params_round_trip_through_url() {
        let api = Arc::new(FakeApi::default());
        let (flow, _) = flow(&api);
        let id = EntitlementId::parse("abc_123").unwrap();
        let url = flow.return_url(&id, ArtifactKind::Voice).unwrap();

        let params = ReturnParams::from_url(url.as_str()).unwrap();
        assert_eq!(params.entitlement_id, id);
        assert_eq!(params.kind, Some(ArtifactKind::Voice));

        assert!(ReturnParams::from_url("https://crush.example/success").is_none());
        assert!(ReturnParams::from_url("https://crush.example/success?entitlement_id=../x").is_none());
        let legacy = ReturnParams::from_url("https://crush.example/success?entitlement_id=E1").unwrap();
        assert_eq!(legacy.kind, None);
    }
}

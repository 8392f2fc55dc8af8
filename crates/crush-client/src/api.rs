//! API Client
//!
//! Typed wrapper over the crushcards HTTP API. The two seams the checkout
//! flow and the poller depend on are traits so they can run against an
//! in-process fake.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use url::Url;

use crush_core::{
    ArtifactKind, Confirmation, Draft, EntitlementId, EntitlementSummary, PricingTier,
    PublicArtifact,
};

use crate::error::{ClientError, Result};

/// Server acknowledgement of a staged entitlement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedEntitlement {
    pub entitlement_id: EntitlementId,
    pub artifact_kind: ArtifactKind,
    pub pricing_tier: PricingTier,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutBody<'a> {
    entitlement_id: &'a EntitlementId,
    tier: PricingTier,
    return_url: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutResponse {
    checkout_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: String,
}

/// Calls the checkout flow makes
#[async_trait]
pub trait CheckoutApi: Send + Sync {
    /// Persist a draft as an unpaid entitlement
    async fn create_entitlement(&self, draft: &Draft) -> Result<StagedEntitlement>;

    /// Create a hosted checkout session and return its redirect URL
    async fn create_checkout(
        &self,
        entitlement_id: &EntitlementId,
        tier: PricingTier,
        return_url: &Url,
    ) -> Result<String>;
}

/// Paid-state read the poller makes
#[async_trait]
pub trait ConfirmationSource: Send + Sync {
    /// `None` until the entitlement is paid
    async fn fetch_confirmation(&self, id: &EntitlementId) -> Result<Option<Confirmation>>;
}

/// HTTP client for the crushcards server
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            token: None,
        })
    }

    /// Session token from the auth collaborator
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{path}: {e}")))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder> {
        let builder = self.http.request(method, self.endpoint(path)?);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    /// Viewer gate read for share links
    pub async fn fetch_artifact(&self, id: &EntitlementId) -> Result<Option<PublicArtifact>> {
        let response = self
            .request(reqwest::Method::GET, &format!("api/artifacts/{id}"))?
            .send()
            .await?;
        optional(response).await
    }

    /// Caller's entitlements, newest first
    pub async fn list_entitlements(&self) -> Result<Vec<EntitlementSummary>> {
        let response = self
            .request(reqwest::Method::GET, "api/entitlements")?
            .send()
            .await?;
        json(response).await
    }
}

#[async_trait]
impl CheckoutApi for ApiClient {
    async fn create_entitlement(&self, draft: &Draft) -> Result<StagedEntitlement> {
        let response = self
            .request(reqwest::Method::POST, "api/entitlements")?
            .json(draft)
            .send()
            .await?;
        json(response).await
    }

    async fn create_checkout(
        &self,
        entitlement_id: &EntitlementId,
        tier: PricingTier,
        return_url: &Url,
    ) -> Result<String> {
        let body = CheckoutBody {
            entitlement_id,
            tier,
            return_url: return_url.as_str(),
        };
        let response = self
            .request(reqwest::Method::POST, "api/checkout")?
            .json(&body)
            .send()
            .await?;
        let session: CheckoutResponse = json(response).await?;
        Ok(session.checkout_url)
    }
}

#[async_trait]
impl ConfirmationSource for ApiClient {
    async fn fetch_confirmation(&self, id: &EntitlementId) -> Result<Option<Confirmation>> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("api/entitlements/{id}/confirmation"),
            )?
            .send()
            .await?;
        optional(response).await
    }
}

async fn json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        Err(api_error(response).await)
    }
}

/// 404 means "not visible yet", not failure
async fn optional<T: DeserializeOwned>(response: reqwest::Response) -> Result<Option<T>> {
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    json(response).await.map(Some)
}

async fn api_error(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let body: ErrorBody = response.json().await.unwrap_or_default();
    ClientError::Api {
        status: status.as_u16(),
        code: body.code,
        message: if body.error.is_empty() {
            "Request failed".into()
        } else {
            body.error
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_join_under_base_path() {
        let client = ApiClient::new("https://crush.example/backend/").unwrap();
        assert_eq!(
            client.endpoint("api/checkout").unwrap().as_str(),
            "https://crush.example/backend/api/checkout"
        );
        assert!(ApiClient::new("not a url").is_err());
    }

    #[test]
    fn test_checkout_body_wire_format() {
        let id = EntitlementId::parse("E1").unwrap();
        let url = Url::parse("https://crush.example/success").unwrap();
        let body = CheckoutBody {
            entitlement_id: &id,
            tier: PricingTier::Premium,
            return_url: url.as_str(),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["entitlementId"], "E1");
        assert_eq!(value["tier"], "premium");
        assert_eq!(value["returnUrl"], "https://crush.example/success");
    }
}

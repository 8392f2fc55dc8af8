//! Dodo Payments
//!
//! Payment-link checkout over Dodo's REST API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::{ENTITLEMENT_METADATA_KEY, PaymentProvider, ProviderSession, ProviderSessionRequest};
use crate::error::{PaymentError, Result};

const LIVE_BASE_URL: &str = "https://live.dodopayments.com";
const TEST_BASE_URL: &str = "https://test.dodopayments.com";
const PLACEHOLDER_EMAIL: &str = "customer@crushcards.app";
const PLACEHOLDER_NAME: &str = "CrushCards User";

#[derive(Debug, Serialize)]
struct Billing<'a> {
    city: &'a str,
    country: &'a str,
    state: &'a str,
    street: &'a str,
    zipcode: &'a str,
}

#[derive(Debug, Serialize)]
struct Customer<'a> {
    email: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct CartItem<'a> {
    product_id: &'a str,
    quantity: u32,
}

#[derive(Debug, Serialize)]
struct CreatePayment<'a> {
    billing: Billing<'a>,
    customer: Customer<'a>,
    payment_link: bool,
    product_cart: Vec<CartItem<'a>>,
    metadata: HashMap<&'static str, &'a str>,
    return_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct PaymentCreated {
    payment_id: String,
    #[serde(default)]
    payment_link: Option<String>,
}

/// Dodo Payments client
pub struct DodoProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl DodoProvider {
    /// Create a client for live or test mode
    pub fn new(api_key: impl Into<String>, live_mode: bool) -> Result<Self> {
        let base = if live_mode { LIVE_BASE_URL } else { TEST_BASE_URL };
        Self::with_base_url(api_key, base)
    }

    /// Create a client against an explicit API base
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| PaymentError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn payment_body(request: &ProviderSessionRequest) -> CreatePayment<'_> {
        CreatePayment {
            billing: Billing {
                city: "",
                country: "US",
                state: "",
                street: "",
                zipcode: "",
            },
            customer: Customer {
                email: request.customer_email.as_deref().unwrap_or(PLACEHOLDER_EMAIL),
                name: PLACEHOLDER_NAME,
            },
            payment_link: true,
            product_cart: vec![CartItem {
                product_id: &request.product_id,
                quantity: 1,
            }],
            metadata: HashMap::from([(ENTITLEMENT_METADATA_KEY, request.entitlement_id.as_str())]),
            return_url: &request.success_url,
        }
    }
}

#[async_trait]
impl PaymentProvider for DodoProvider {
    async fn create_session(&self, request: &ProviderSessionRequest) -> Result<ProviderSession> {
        let response = self
            .http
            .post(format!("{}/payments", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&Self::payment_body(request))
            .send()
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Dodo payment creation failed");
            return Err(PaymentError::Provider(format!("Dodo returned {status}")));
        }

        let created: PaymentCreated = response
            .json()
            .await
            .map_err(|e| PaymentError::Provider(format!("unreadable Dodo response: {e}")))?;

        let checkout_url = created
            .payment_link
            .ok_or_else(|| PaymentError::Provider("No payment link returned".into()))?;

        Ok(ProviderSession {
            session_id: created.payment_id,
            checkout_url,
        })
    }

    fn name(&self) -> &str {
        "dodo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crush_core::{EntitlementId, PricingTier};

    #[test]
    fn test_payment_body_carries_metadata() {
        let request = ProviderSessionRequest {
            product_id: "pdt_basic".into(),
            entitlement_id: EntitlementId::parse("E1").unwrap(),
            tier: PricingTier::Basic,
            success_url: "https://crush.example/success?entitlement_id=E1".into(),
            customer_email: None,
        };

        let body = serde_json::to_value(DodoProvider::payment_body(&request)).unwrap();
        assert_eq!(body["metadata"]["entitlement_id"], "E1");
        assert_eq!(body["product_cart"][0]["product_id"], "pdt_basic");
        assert_eq!(body["payment_link"], true);
        assert_eq!(body["customer"]["email"], PLACEHOLDER_EMAIL);
        assert_eq!(body["return_url"], request.success_url);
    }

    #[test]
    fn test_mode_selects_base_url() {
        let live = DodoProvider::new("key", true).unwrap();
        let test = DodoProvider::new("key", false).unwrap();
        assert_eq!(live.base_url, LIVE_BASE_URL);
        assert_eq!(test.base_url, TEST_BASE_URL);
    }
}

//! Stripe Checkout
//!
//! Hosted Checkout in one-time `payment` mode against a configured price id.

use async_trait::async_trait;
use std::collections::HashMap;

use ::stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCheckoutSessionPaymentIntentData,
};

use super::{ENTITLEMENT_METADATA_KEY, PaymentProvider, ProviderSession, ProviderSessionRequest};
use crate::error::{PaymentError, Result};

/// Stripe client wrapper
pub struct StripeProvider {
    client: Client,
}

impl StripeProvider {
    /// Create a new Stripe provider
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }

    /// Get the underlying Stripe client
    pub const fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_session(&self, request: &ProviderSessionRequest) -> Result<ProviderSession> {
        let metadata = HashMap::from([(
            ENTITLEMENT_METADATA_KEY.to_string(),
            request.entitlement_id.to_string(),
        )]);

        let mut params = CreateCheckoutSession::new();
        params.success_url = Some(&request.success_url);
        params.mode = Some(CheckoutSessionMode::Payment);
        params.client_reference_id = Some(request.entitlement_id.as_str());
        params.customer_email = request.customer_email.as_deref();
        params.metadata = Some(metadata.clone());

        // Also on the PaymentIntent, so payment_intent.succeeded events correlate
        params.payment_intent_data = Some(CreateCheckoutSessionPaymentIntentData {
            metadata: Some(metadata),
            ..Default::default()
        });

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(request.product_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?;

        let checkout_url = session
            .url
            .ok_or_else(|| PaymentError::Provider("No checkout URL returned".into()))?;

        Ok(ProviderSession {
            session_id: session.id.to_string(),
            checkout_url,
        })
    }

    fn name(&self) -> &str {
        "stripe"
    }
}

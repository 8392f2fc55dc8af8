//! # crush-payments
//!
//! Entitlement storage, hosted checkout and payment webhooks for crushcards.
//!
//! ## Payment flow
//!
//! ```text
//! ┌──────────┐ stage  ┌─────────────┐ session ┌──────────────┐
//! │ Browser  │───────▶│ Entitlement │────────▶│   Provider   │
//! │          │        │ (unpaid)    │         │ hosted page  │
//! └──────────┘        └─────────────┘         └──────┬───────┘
//!      ▲                     ▲                       │ webhook
//!      │ poll                │ mark paid             ▼
//!      │              ┌──────┴──────────────────────────┐
//!      └──────────────│ WebhookReceiver (verify → CAS)  │
//!                     └─────────────────────────────────┘
//! ```
//!
//! The provider never sees anything but a product id, a return URL and the
//! entitlement id as metadata. The browser never writes `paid`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crush_payments::{CheckoutService, MemoryEntitlementStore, MockPaymentProvider, TierCatalog};
//!
//! let store = Arc::new(MemoryEntitlementStore::new());
//! let catalog = TierCatalog::new().with_product(PricingTier::Basic, "pdt_basic");
//! let checkout = CheckoutService::new(store, Arc::new(MockPaymentProvider::new()), catalog);
//!
//! let record = checkout.stage_entitlement(&owner, draft)?;
//! let session = checkout.create_checkout_session(&owner, CheckoutRequest {
//!     entitlement_id: record.id,
//!     tier: PricingTier::Basic,
//!     return_url: "https://crush.example/success".into(),
//! }).await?;
//!
//! // Redirect user to: session.checkout_url
//! ```

mod checkout;
mod error;
mod plan;
pub mod provider;
pub mod signature;
mod store;
mod webhook;

pub use checkout::{
    CheckoutRequest, CheckoutService, CheckoutSession, RETURN_ID_PARAM, TierCatalog,
    stage_entitlement,
};
pub use error::{PaymentError, Result};
pub use plan::{MemoryOwnerPlanStore, OwnerPlan, OwnerPlanStore, PlanUpgrade};
pub use provider::{
    DodoProvider, MockPaymentProvider, PaymentProvider, ProviderSession, ProviderSessionRequest,
    StripeProvider,
};
pub use signature::{SignatureScheme, WebhookHeaders, WebhookVerifier};
pub use store::{EntitlementStore, FileEntitlementStore, MarkPaid, MemoryEntitlementStore};
pub use webhook::{SUCCESS_EVENT_TYPES, WebhookEvent, WebhookOutcome, WebhookReceiver};

//! # crush-client
//!
//! Browser-side half of the crushcards payment flow, as a plain async library.
//!
//! ```text
//! ┌────────────┐ begin ┌──────────────┐ redirect ┌──────────────┐
//! │ DraftStore │──────▶│ CheckoutFlow │─────────▶│   Provider   │
//! └────────────┘       └──────────────┘          └──────┬───────┘
//!                                                       │ return_url
//!                      ┌────────────────────┐           ▼
//!                      │ ConfirmationPoller │◀──── /success?entitlement_id=…
//!                      └─────────┬──────────┘
//!                                ▼
//!                     Ready(share path) | Delayed | Cancelled
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let api = Arc::new(ApiClient::new("https://api.crush.example/")?.with_token(token));
//! let drafts = Arc::new(DraftStore::new());
//! let flow = CheckoutFlow::new(Arc::clone(&api), Arc::clone(&drafts), "https://crush.example")?;
//!
//! let draft_id = drafts.stage(draft)?;
//! let redirect = flow.begin(draft_id).await?;
//! // Navigate to redirect.checkout_url
//!
//! // Later, on the success page:
//! let params = ReturnParams::from_url(&current_url).ok_or(...)?;
//! let handle = ConfirmationPoller::new(api).spawn(params.entitlement_id);
//! match handle.outcome().await {
//!     PollOutcome::Ready(c) => show_share_link(&c.share_path),
//!     PollOutcome::Delayed { .. } => show_payment_delayed(),
//!     PollOutcome::Cancelled => {}
//! }
//! ```

mod api;
mod checkout_flow;
mod drafts;
mod error;
mod poller;

pub use api::{ApiClient, CheckoutApi, ConfirmationSource, StagedEntitlement};
pub use checkout_flow::{
    CheckoutFlow, CheckoutRedirect, RETURN_ID_PARAM, RETURN_KIND_PARAM, ReturnParams,
};
pub use drafts::DraftStore;
pub use error::{ClientError, Result};
pub use poller::{ConfirmationPoller, PollHandle, PollOutcome, PollPolicy};

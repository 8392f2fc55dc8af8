//! # crush-core
//!
//! Domain types shared by the crushcards server and client.
//!
//! ## Lifecycle
//!
//! ```text
//! ┌─────────┐  stage   ┌──────────────────┐  webhook  ┌──────────────────┐
//! │  Draft  │─────────▶│ Entitlement      │──────────▶│ Entitlement      │
//! │ (client)│          │ paid = false     │           │ paid = true      │
//! └─────────┘          └──────────────────┘           └──────────────────┘
//!                                                         │
//!                                                         ▼
//!                                                   PublicArtifact
//!                                                   (share link)
//! ```
//!
//! A [`Draft`] lives only on the client. Staging it creates an unpaid
//! [`EntitlementRecord`]; the payment webhook flips `paid` exactly once and
//! nothing ever flips it back.

pub mod artifact;
pub mod draft;
pub mod entitlement;
pub mod error;
pub mod tier;

pub use artifact::{
    ArtifactKind, ArtifactPayload, BouquetPayload, CardPayload, CardTheme, NoButtonTrick,
    StickerPlacement, VoicePayload,
};
pub use draft::{Draft, DraftId};
pub use entitlement::{
    Confirmation, EntitlementId, EntitlementRecord, EntitlementSummary, OwnerId, PublicArtifact,
};
pub use error::{CoreError, Result};
pub use tier::PricingTier;

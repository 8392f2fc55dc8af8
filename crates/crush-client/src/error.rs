//! Client Error Types

use crush_core::{CoreError, DraftId};
use thiserror::Error;

use crate::api::StagedEntitlement;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client-side errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid draft: {0}")]
    InvalidDraft(#[from] CoreError),

    /// Draft was never staged or has already been checked out
    #[error("Draft not found: {0}")]
    DraftNotFound(DraftId),

    /// Entitlement exists but the checkout session could not be created
    #[error("Checkout failed for {}: {source}", .staged.entitlement_id)]
    CheckoutFailed {
        staged: StagedEntitlement,
        #[source]
        source: Box<ClientError>,
    },
}

impl ClientError {
    /// Entitlement to reuse on retry, if one was already created
    pub const fn retry_entitlement(&self) -> Option<&StagedEntitlement> {
        match self {
            Self::CheckoutFailed { staged, .. } => Some(staged),
            _ => None,
        }
    }

    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            Self::CheckoutFailed { source, .. } => source.user_message(),
            Self::DraftNotFound(_) => "This draft is no longer available.".into(),
            Self::InvalidDraft(e) => e.to_string(),
            Self::Http(_) | Self::InvalidUrl(_) => "Could not reach the server. Please try again.".into(),
        }
    }
}

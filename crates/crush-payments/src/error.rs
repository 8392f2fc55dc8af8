//! Payment Error Types

use crush_core::CoreError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Missing product mapping, API key or webhook secret
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payment provider call failed or returned a non-success status
    #[error("Payment provider error: {0}")]
    Provider(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Verified webhook body could not be parsed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Entitlement absent (or not visible to the caller)
    #[error("Entitlement not found: {0}")]
    NotFound(String),

    /// Checkout requested for an entitlement that is already paid
    #[error("Entitlement already paid: {0}")]
    AlreadyPaid(String),

    /// Requested tier differs from the staged one
    #[error("Tier mismatch: requested {requested}, staged {staged}")]
    TierMismatch { requested: String, staged: String },

    /// Return URL unusable
    #[error("Invalid return URL: {0}")]
    InvalidReturnUrl(String),

    /// Draft failed validation
    #[error("Invalid draft: {0}")]
    InvalidDraft(String),

    /// Entitlement store read/write failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::Storage(_) | Self::NotFound(_)
        )
    }

    /// Get user-friendly message
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Provider(_) => "Payment processing failed. Please try again.",
            Self::NotFound(_) => "This creation could not be found.",
            Self::AlreadyPaid(_) => "This creation has already been paid for.",
            Self::TierMismatch { .. } => "The selected plan does not match this creation.",
            Self::InvalidReturnUrl(_) => "Invalid return address.",
            Self::InvalidDraft(_) => "Some details of your creation are invalid.",
            Self::WebhookSignature(_) => "Invalid signature.",
            Self::Config(_) => "Service configuration error.",
            _ => "An error occurred processing your request.",
        }
    }
}

impl From<CoreError> for PaymentError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidDraft(msg) => Self::InvalidDraft(msg),
            CoreError::InvalidId(id) => Self::NotFound(id),
            other => Self::InvalidDraft(other.to_string()),
        }
    }
}

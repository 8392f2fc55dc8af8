//! Error Types

use thiserror::Error;

/// Result type alias for domain operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Domain validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Draft failed validation
    #[error("Invalid draft: {0}")]
    InvalidDraft(String),

    /// Pricing tier string not recognized
    #[error("Unknown pricing tier: {0}")]
    UnknownTier(String),

    /// Artifact kind string not recognized
    #[error("Unknown artifact kind: {0}")]
    UnknownKind(String),

    /// Identifier could not be parsed
    #[error("Invalid identifier: {0}")]
    InvalidId(String),
}

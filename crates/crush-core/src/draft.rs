//! Drafts
//!
//! An in-progress artifact plus the tier the creator picked. Drafts are
//! client-side only and are consumed once, when checkout starts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::{ArtifactKind, ArtifactPayload};
use crate::error::{CoreError, Result};
use crate::tier::PricingTier;

/// Longest accepted sender/recipient name
pub const MAX_NAME_LEN: usize = 80;

/// Client-side draft handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftId(Uuid);

impl DraftId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DraftId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DraftId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Builder output awaiting checkout
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub payload: ArtifactPayload,

    #[serde(default)]
    pub pricing_tier: PricingTier,

    #[serde(default)]
    pub recipient_name: Option<String>,

    #[serde(default)]
    pub sender_name: Option<String>,
}

impl Draft {
    pub fn new(payload: ArtifactPayload, pricing_tier: PricingTier) -> Self {
        Self {
            payload,
            pricing_tier,
            recipient_name: None,
            sender_name: None,
        }
    }

    #[must_use]
    pub fn with_names(mut self, recipient: impl Into<String>, sender: impl Into<String>) -> Self {
        self.recipient_name = Some(recipient.into());
        self.sender_name = Some(sender.into());
        self
    }

    pub const fn artifact_kind(&self) -> ArtifactKind {
        self.payload.kind()
    }

    pub fn validate(&self) -> Result<()> {
        for (label, name) in [
            ("recipient", &self.recipient_name),
            ("sender", &self.sender_name),
        ] {
            if name.as_deref().is_some_and(|n| n.chars().count() > MAX_NAME_LEN) {
                return Err(CoreError::InvalidDraft(format!(
                    "{label} name exceeds {MAX_NAME_LEN} characters"
                )));
            }
        }
        self.payload.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::CardPayload;

    #[test]
    fn test_draft_wire_format() {
        let json = r#"{
            "payload": {"kind": "bouquet", "flowers": ["red-rose", "tulip"]},
            "pricingTier": "premium",
            "recipientName": "Sam"
        }"#;
        let draft: Draft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.artifact_kind(), ArtifactKind::Bouquet);
        assert_eq!(draft.pricing_tier, PricingTier::Premium);
        assert_eq!(draft.sender_name, None);
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn test_long_name_rejected() {
        let draft = Draft::new(ArtifactPayload::Card(CardPayload::default()), PricingTier::Basic)
            .with_names("x".repeat(MAX_NAME_LEN + 1), "me");
        assert!(matches!(draft.validate(), Err(CoreError::InvalidDraft(_))));
    }
}

//! Entitlements
//!
//! The durable record that an artifact exists and whether it has been paid
//! for. `paid` only moves from `false` to `true`; the record offers no way
//! back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::{ArtifactKind, ArtifactPayload};
use crate::draft::Draft;
use crate::error::{CoreError, Result};
use crate::tier::PricingTier;

const MAX_ID_LEN: usize = 64;

/// Opaque entitlement identifier, doubling as the share-link key
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntitlementId(String);

impl EntitlementId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Parse an identifier arriving from a URL, request body or provider metadata
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let well_formed = !s.is_empty()
            && s.len() <= MAX_ID_LEN
            && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if well_formed {
            Ok(Self(s.to_string()))
        } else {
            Err(CoreError::InvalidId(s.chars().take(MAX_ID_LEN).collect()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntitlementId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<EntitlementId> for String {
    fn from(id: EntitlementId) -> Self {
        id.0
    }
}

impl std::fmt::Display for EntitlementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated creator identity
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entitlement record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementRecord {
    pub id: EntitlementId,

    pub owner_id: OwnerId,

    pub artifact_kind: ArtifactKind,

    pub pricing_tier: PricingTier,

    pub payload: ArtifactPayload,

    #[serde(default)]
    pub recipient_name: Option<String>,

    #[serde(default)]
    pub sender_name: Option<String>,

    pub created_at: DateTime<Utc>,

    paid: bool,

    #[serde(default)]
    paid_at: Option<DateTime<Utc>>,
}

impl EntitlementRecord {
    /// Create an unpaid record from a draft
    pub fn from_draft(owner_id: OwnerId, draft: Draft) -> Self {
        Self {
            id: EntitlementId::generate(),
            owner_id,
            artifact_kind: draft.payload.kind(),
            pricing_tier: draft.pricing_tier,
            payload: draft.payload,
            recipient_name: draft.recipient_name,
            sender_name: draft.sender_name,
            created_at: Utc::now(),
            paid: false,
            paid_at: None,
        }
    }

    /// `artifact_kind` agrees with the payload it describes
    pub fn kind_matches_payload(&self) -> bool {
        self.artifact_kind == self.payload.kind()
    }

    pub const fn is_paid(&self) -> bool {
        self.paid
    }

    pub const fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    /// Flip to paid. Returns `false` when the record was already paid.
    pub fn mark_paid(&mut self, at: DateTime<Utc>) -> bool {
        if self.paid {
            return false;
        }
        self.paid = true;
        self.paid_at = Some(at);
        true
    }

    pub fn share_path(&self) -> String {
        format!("{}/{}", self.artifact_kind.view_prefix(), self.id)
    }

    /// Recipient-facing view, only available once paid
    pub fn public_view(&self) -> Option<PublicArtifact> {
        self.paid.then(|| PublicArtifact {
            entitlement_id: self.id.clone(),
            artifact_kind: self.artifact_kind,
            payload: self.payload.clone(),
            recipient_name: self.recipient_name.clone(),
            sender_name: self.sender_name.clone(),
        })
    }

    /// What the confirmation poller sees, only available once paid
    pub fn confirmation(&self) -> Option<Confirmation> {
        self.paid.then(|| Confirmation {
            entitlement_id: self.id.clone(),
            artifact_kind: self.artifact_kind,
            pricing_tier: self.pricing_tier,
            share_path: self.share_path(),
        })
    }

    pub fn summary(&self) -> EntitlementSummary {
        EntitlementSummary {
            entitlement_id: self.id.clone(),
            artifact_kind: self.artifact_kind,
            pricing_tier: self.pricing_tier,
            recipient_name: self.recipient_name.clone(),
            sender_name: self.sender_name.clone(),
            paid: self.paid,
            created_at: self.created_at,
            share_path: self.paid.then(|| self.share_path()),
        }
    }
}

/// Artifact as served to share-link recipients
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicArtifact {
    pub entitlement_id: EntitlementId,
    pub artifact_kind: ArtifactKind,
    pub payload: ArtifactPayload,
    pub recipient_name: Option<String>,
    pub sender_name: Option<String>,
}

/// Paid-state confirmation returned to the polling client
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub entitlement_id: EntitlementId,
    pub artifact_kind: ArtifactKind,
    pub pricing_tier: PricingTier,
    pub share_path: String,
}

/// Dashboard row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementSummary {
    pub entitlement_id: EntitlementId,
    pub artifact_kind: ArtifactKind,
    pub pricing_tier: PricingTier,
    pub recipient_name: Option<String>,
    pub sender_name: Option<String>,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
    pub share_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{CardPayload, VoicePayload};

    fn voice_record() -> EntitlementRecord {
        let draft = Draft::new(
            ArtifactPayload::Voice(VoicePayload {
                voice_note_url: "https://cdn.example/a.webm".into(),
                background_image_url: None,
                duration_secs: 12,
            }),
            PricingTier::Premium,
        );
        EntitlementRecord::from_draft(OwnerId::from_string("user-1"), draft)
    }

    #[test]
    fn test_new_record_is_unpaid_and_hidden() {
        let record = voice_record();
        assert!(!record.is_paid());
        assert!(record.public_view().is_none());
        assert!(record.confirmation().is_none());
        assert_eq!(record.summary().share_path, None);
    }

    #[test]
    fn test_mark_paid_is_monotonic() {
        let mut record = voice_record();
        let first = Utc::now();
        assert!(record.mark_paid(first));
        assert!(!record.mark_paid(Utc::now()));
        assert!(record.is_paid());
        assert_eq!(record.paid_at(), Some(first));
    }

    #[test]
    fn test_paid_record_exposes_views() {
        let mut record = voice_record();
        record.mark_paid(Utc::now());

        let confirmation = record.confirmation().unwrap();
        assert_eq!(confirmation.share_path, format!("/voice/{}", record.id));
        assert_eq!(confirmation.pricing_tier, PricingTier::Premium);

        let public = record.public_view().unwrap();
        assert_eq!(public.artifact_kind, ArtifactKind::Voice);
    }

    #[test]
    fn test_summary_carries_names() {
        let draft = Draft::new(ArtifactPayload::Card(CardPayload::default()), PricingTier::Basic)
            .with_names("Sam", "Alex");
        let record = EntitlementRecord::from_draft(OwnerId::from_string("user-3"), draft);

        let summary = record.summary();
        assert_eq!(summary.recipient_name.as_deref(), Some("Sam"));
        assert_eq!(summary.sender_name.as_deref(), Some("Alex"));
    }

    #[test]
    fn test_kind_must_match_payload() {
        let mut record = voice_record();
        assert!(record.kind_matches_payload());

        record.artifact_kind = ArtifactKind::Bouquet;
        assert!(!record.kind_matches_payload());
    }

    #[test]
    fn test_id_parsing() {
        let id = EntitlementId::generate();
        assert_eq!(EntitlementId::parse(id.as_str()).unwrap(), id);
        assert!(EntitlementId::parse("").is_err());
        assert!(EntitlementId::parse("../etc/passwd").is_err());
        assert!(EntitlementId::parse(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_record_serde_keeps_paid_flag() {
        let mut record = EntitlementRecord::from_draft(
            OwnerId::from_string("user-2"),
            Draft::new(ArtifactPayload::Card(CardPayload::default()), PricingTier::Basic),
        );
        record.mark_paid(Utc::now());

        let json = serde_json::to_string(&record).unwrap();
        let back: EntitlementRecord = serde_json::from_str(&json).unwrap();
        assert!(back.is_paid());
        assert_eq!(back.id, record.id);
    }
}

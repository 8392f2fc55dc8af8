//! Draft Store
//!
//! Builder output waiting for checkout, keyed by [`DraftId`] so several
//! drafts can be in flight at once. A draft is taken exactly once, when
//! checkout begins.

use std::collections::HashMap;
use std::sync::Mutex;

use crush_core::{Draft, DraftId};

use crate::error::{ClientError, Result};

#[derive(Debug, Default)]
pub struct DraftStore {
    drafts: Mutex<HashMap<DraftId, Draft>>,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and keep a draft, returning its handle
    pub fn stage(&self, draft: Draft) -> Result<DraftId> {
        draft.validate()?;
        let id = DraftId::new();
        self.lock().insert(id, draft);
        tracing::debug!(draft_id = %id, "Draft staged");
        Ok(id)
    }

    /// Remove and return a draft; a second take fails
    pub fn take(&self, id: DraftId) -> Result<Draft> {
        self.lock().remove(&id).ok_or(ClientError::DraftNotFound(id))
    }

    /// Put a taken draft back under the same handle
    pub fn restore(&self, id: DraftId, draft: Draft) {
        self.lock().insert(id, draft);
    }

    pub fn get(&self, id: DraftId) -> Option<Draft> {
        self.lock().get(&id).cloned()
    }

    /// Drop a draft the user abandoned
    pub fn discard(&self, id: DraftId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn ids(&self) -> Vec<DraftId> {
        self.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<DraftId, Draft>> {
        // Map operations cannot leave it half-updated
        self.drafts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crush_core::{ArtifactPayload, BouquetPayload, CardPayload, PricingTier};

    fn card() -> Draft {
        Draft::new(ArtifactPayload::Card(CardPayload::default()), PricingTier::Basic)
    }

    #[test]
    fn test_take_consumes_once() {
        let store = DraftStore::new();
        let id = store.stage(card()).unwrap();

        assert_eq!(store.take(id).unwrap(), card());
        assert!(matches!(store.take(id), Err(ClientError::DraftNotFound(d)) if d == id));
        assert!(store.is_empty());
    }

    #[test]
    fn test_drafts_are_independent() {
        let store = DraftStore::new();
        let a = store.stage(card()).unwrap();
        let b = store
            .stage(Draft::new(
                ArtifactPayload::Bouquet(BouquetPayload {
                    flowers: vec!["red-rose".into(), "tulip".into()],
                    ..BouquetPayload::default()
                }),
                PricingTier::Premium,
            ))
            .unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.discard(a));
        assert!(!store.discard(a));
        assert_eq!(store.ids(), vec![b]);
        assert_eq!(store.get(b).unwrap().pricing_tier, PricingTier::Premium);
    }

    #[test]
    fn test_rejects_invalid_draft() {
        let store = DraftStore::new();
        let draft = card().with_names("x".repeat(200), "me");
        assert!(matches!(store.stage(draft), Err(ClientError::InvalidDraft(_))));
        assert!(store.is_empty());
    }
}

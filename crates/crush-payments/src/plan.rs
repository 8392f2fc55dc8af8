//! Owner Plans
//!
//! Secondary, best-effort record of what each owner has bought. Written only
//! by the webhook receiver after a first paid transition.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use crush_core::{EntitlementId, OwnerId, PricingTier};
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

/// One applied upgrade
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpgrade {
    pub owner_id: OwnerId,
    pub entitlement_id: EntitlementId,
    pub tier: PricingTier,
    pub at: DateTime<Utc>,
}

/// Per-owner plan state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerPlan {
    pub owner_id: OwnerId,

    /// Highest tier ever purchased
    pub tier: PricingTier,

    pub upgrades: Vec<PlanUpgrade>,
}

/// Owner plan storage trait
pub trait OwnerPlanStore: Send + Sync {
    /// Apply an upgrade. Re-applying the same entitlement is a no-op.
    fn apply_upgrade(&self, upgrade: &PlanUpgrade) -> Result<OwnerPlan>;

    /// Get plan by owner
    fn get(&self, owner: &OwnerId) -> Result<Option<OwnerPlan>>;
}

/// In-memory plan store
pub struct MemoryOwnerPlanStore {
    plans: RwLock<HashMap<OwnerId, OwnerPlan>>,
}

impl Default for MemoryOwnerPlanStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOwnerPlanStore {
    pub fn new() -> Self {
        Self {
            plans: RwLock::new(HashMap::new()),
        }
    }
}

impl OwnerPlanStore for MemoryOwnerPlanStore {
    fn apply_upgrade(&self, upgrade: &PlanUpgrade) -> Result<OwnerPlan> {
        let mut plans = self
            .plans
            .write()
            .map_err(|_| PaymentError::Storage("plan store lock poisoned".into()))?;

        let plan = plans
            .entry(upgrade.owner_id.clone())
            .or_insert_with(|| OwnerPlan {
                owner_id: upgrade.owner_id.clone(),
                tier: upgrade.tier,
                upgrades: Vec::new(),
            });

        if !plan
            .upgrades
            .iter()
            .any(|u| u.entitlement_id == upgrade.entitlement_id)
        {
            plan.tier = plan.tier.max(upgrade.tier);
            plan.upgrades.push(upgrade.clone());
        }

        Ok(plan.clone())
    }

    fn get(&self, owner: &OwnerId) -> Result<Option<OwnerPlan>> {
        let plans = self
            .plans
            .read()
            .map_err(|_| PaymentError::Storage("plan store lock poisoned".into()))?;
        Ok(plans.get(owner).cloned())
    }
}

//! Quota management for organizations
//!
//! Resource ceilings are sized by subscription tier and enforced at
//! mutation time. The check and the increment are one atomic operation:
//! all counter writes for an organization are funneled through a
//! per-organization writer lock, so two concurrent creators can never
//! both pass the ceiling check before either commits.

use crate::organization::{Organization, OrgStatus, SubscriptionTier};
use crate::store::TenantStore;
use crate::{Result, TenantError};
use campus_core::{OrgId, QuotaAlertConfig};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Resource kinds subject to quota ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Member accounts
    Users,
    /// Classes hosted by the organization
    Classes,
    /// Storage in bytes
    Storage,
    /// API calls per billing period
    ApiCalls,
    /// Live sessions
    Sessions,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        Self::Users,
        Self::Classes,
        Self::Storage,
        Self::ApiCalls,
        Self::Sessions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Classes => "classes",
            Self::Storage => "storage",
            Self::ApiCalls => "api_calls",
            Self::Sessions => "sessions",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-resource ceilings for one organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaTable {
    limits: HashMap<ResourceKind, u64>,
}

impl QuotaTable {
    /// Default ceilings for a tier
    pub fn for_tier(tier: SubscriptionTier) -> Self {
        let mut limits = HashMap::new();
        limits.insert(ResourceKind::Users, tier.default_max_users());
        limits.insert(ResourceKind::Classes, tier.default_max_classes());
        limits.insert(ResourceKind::Storage, tier.default_storage_limit());
        limits.insert(ResourceKind::ApiCalls, tier.default_api_calls_limit());
        limits.insert(ResourceKind::Sessions, tier.default_max_sessions());
        Self { limits }
    }

    pub fn get(&self, kind: ResourceKind) -> u64 {
        self.limits.get(&kind).copied().unwrap_or(0)
    }

    /// Override one ceiling (custom contracts)
    pub fn set(&mut self, kind: ResourceKind, limit: u64) {
        self.limits.insert(kind, limit);
    }
}

/// Point-in-time usage report for one resource kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaUsageReport {
    pub kind: ResourceKind,
    pub current: u64,
    pub limit: u64,
    pub percentage: f64,
    pub warning: bool,
    pub critical: bool,
}

impl QuotaUsageReport {
    pub fn new(kind: ResourceKind, current: u64, limit: u64, thresholds: &QuotaAlertConfig) -> Self {
        let percentage = if limit > 0 {
            (current as f64 / limit as f64) * 100.0
        } else {
            0.0
        };
        let fraction = percentage / 100.0;

        Self {
            kind,
            current,
            limit,
            percentage,
            warning: fraction >= thresholds.warning_threshold,
            critical: fraction >= thresholds.critical_threshold,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.current)
    }
}

/// Build usage reports for every resource kind of an organization
pub fn usage_reports(org: &Organization, thresholds: &QuotaAlertConfig) -> Vec<QuotaUsageReport> {
    ResourceKind::ALL
        .iter()
        .map(|&kind| QuotaUsageReport::new(kind, org.usage_of(kind), org.limit_of(kind), thresholds))
        .collect()
}

/// Enforces resource ceilings for all organizations.
///
/// Counter state lives on the organization record; the enforcer is the
/// only component allowed to move it. Writes for one organization are
/// serialized through a per-org async lock held across the
/// read-check-write cycle.
pub struct QuotaEnforcer {
    store: Arc<dyn TenantStore>,
    thresholds: QuotaAlertConfig,
    write_locks: DashMap<OrgId, Arc<Mutex<()>>>,
}

impl QuotaEnforcer {
    pub fn new(store: Arc<dyn TenantStore>, thresholds: QuotaAlertConfig) -> Self {
        Self {
            store,
            thresholds,
            write_locks: DashMap::new(),
        }
    }

    fn write_lock(&self, org_id: OrgId) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(org_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load_org(&self, org_id: OrgId) -> Result<Organization> {
        self.store
            .get_org(org_id)
            .await?
            .ok_or_else(|| TenantError::NotFound(org_id.to_string()))
    }

    /// Whether one more unit of `kind` fits under the ceiling.
    ///
    /// Advisory only; `try_increment` re-checks under the writer lock.
    pub async fn can_add(&self, org_id: OrgId, kind: ResourceKind) -> Result<bool> {
        let org = self.load_org(org_id).await?;
        Ok(org.usage_of(kind) < org.limit_of(kind))
    }

    /// Atomically check the ceiling and commit an increment.
    ///
    /// Fails with `QuotaExceeded` and commits nothing when the increment
    /// would cross the ceiling. Returns the new counter value.
    pub async fn try_increment(&self, org_id: OrgId, kind: ResourceKind, amount: u64) -> Result<u64> {
        let lock = self.write_lock(org_id);
        let _guard = lock.lock().await;

        let mut org = self.load_org(org_id).await?;
        let current = org.usage_of(kind);
        let limit = org.limit_of(kind);

        if current + amount > limit {
            debug!(
                org_id = %org_id,
                kind = %kind,
                current = current,
                requested = amount,
                limit = limit,
                "Quota increment rejected"
            );
            return Err(TenantError::QuotaExceeded {
                kind,
                current,
                requested: amount,
                limit,
            });
        }

        let new_total = current + amount;
        org.usage.insert(kind, new_total);
        org.touch();
        self.store.update_org(&org).await?;

        self.warn_if_near_limit(org_id, kind, new_total, limit);
        debug!(org_id = %org_id, kind = %kind, new_total = new_total, "Incremented quota usage");
        Ok(new_total)
    }

    /// Increment a metered counter, clamping at the ceiling instead of
    /// failing. Used for counters where the triggering work has already
    /// happened (e.g. API calls).
    pub async fn record_saturating(&self, org_id: OrgId, kind: ResourceKind, amount: u64) -> Result<u64> {
        let lock = self.write_lock(org_id);
        let _guard = lock.lock().await;

        let mut org = self.load_org(org_id).await?;
        let limit = org.limit_of(kind);
        let new_total = org.usage_of(kind).saturating_add(amount).min(limit);

        org.usage.insert(kind, new_total);
        org.touch();
        self.store.update_org(&org).await?;

        self.warn_if_near_limit(org_id, kind, new_total, limit);
        Ok(new_total)
    }

    /// Decrement a counter, flooring at zero. Returns the new value.
    pub async fn decrement(&self, org_id: OrgId, kind: ResourceKind, amount: u64) -> Result<u64> {
        let lock = self.write_lock(org_id);
        let _guard = lock.lock().await;

        let mut org = self.load_org(org_id).await?;
        let new_total = org.usage_of(kind).saturating_sub(amount);

        org.usage.insert(kind, new_total);
        org.touch();
        self.store.update_org(&org).await?;

        debug!(org_id = %org_id, kind = %kind, new_total = new_total, "Decremented quota usage");
        Ok(new_total)
    }

    /// Usage percentage report for every resource kind
    pub async fn usage_percentage(&self, org_id: OrgId) -> Result<Vec<QuotaUsageReport>> {
        let org = self.load_org(org_id).await?;
        Ok(usage_reports(&org, &self.thresholds))
    }

    /// Atomically apply a new tier: replaces the quota table, moves the
    /// status toward `Active`, and opens a fresh subscription window.
    pub async fn upgrade_tier(&self, org_id: OrgId, new_tier: SubscriptionTier) -> Result<Organization> {
        let lock = self.write_lock(org_id);
        let _guard = lock.lock().await;

        let mut org = self.load_org(org_id).await?;
        let old_tier = org.tier;

        org.tier = new_tier;
        org.limits = QuotaTable::for_tier(new_tier);

        // A shrinking table could leave counters above their ceilings;
        // clamp so the usage invariant survives the change.
        for kind in ResourceKind::ALL {
            let limit = org.limit_of(kind);
            let current = org.usage_of(kind);
            if current > limit {
                warn!(
                    org_id = %org_id,
                    kind = %kind,
                    current = current,
                    limit = limit,
                    "Clamping usage to new tier ceiling"
                );
                org.usage.insert(kind, limit);
            }
        }

        if org.status != OrgStatus::Active && org.status.can_transition_to(OrgStatus::Active) {
            org.status = OrgStatus::Active;
        }

        let now = Utc::now();
        org.current_period_start = Some(now);
        org.current_period_end = Some(now + chrono::Duration::days(30));
        org.touch();
        self.store.update_org(&org).await?;

        info!(
            org_id = %org_id,
            old_tier = %old_tier.as_str(),
            new_tier = %new_tier.as_str(),
            "Applied tier change"
        );
        Ok(org)
    }

    fn warn_if_near_limit(&self, org_id: OrgId, kind: ResourceKind, current: u64, limit: u64) {
        if limit == 0 {
            return;
        }
        let fraction = current as f64 / limit as f64;
        if fraction >= self.thresholds.critical_threshold {
            warn!(org_id = %org_id, kind = %kind, current = current, limit = limit, "Quota critically close to ceiling");
        } else if fraction >= self.thresholds.warning_threshold {
            warn!(org_id = %org_id, kind = %kind, current = current, limit = limit, "Quota warning threshold reached");
        }
    }
}

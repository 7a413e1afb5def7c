//! Append-only usage snapshots
//!
//! Periodic point-in-time captures of an organization's counters for
//! reporting. Entries are immutable once appended; this subsystem never
//! rewrites or deletes them. Reads take no locks on the live counters,
//! so reporting is safe to run alongside any other tenant operation.

use crate::member::Member;
use crate::quota::{usage_reports, QuotaUsageReport, ResourceKind};
use crate::store::TenantStore;
use crate::{Result, TenantError};
use campus_core::{OrgId, QuotaAlertConfig, UsageLogConfig};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Cadence tag on a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageLogType {
    Daily,
    Weekly,
    Monthly,
    OnDemand,
}

impl UsageLogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::OnDemand => "on_demand",
        }
    }
}

/// Immutable snapshot of an organization's usage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLogEntry {
    pub id: Uuid,
    pub organization_id: OrgId,
    pub log_type: UsageLogType,
    /// Counter values at capture time
    pub counters: HashMap<ResourceKind, u64>,
    /// Ceilings at capture time; kept alongside the counters so old
    /// entries stay meaningful across tier changes
    pub limits: HashMap<ResourceKind, u64>,
    /// Members active within the configured window before the capture
    pub active_members: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Snapshots in a range plus the live counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub organization_id: OrgId,
    pub entries: Vec<UsageLogEntry>,
    pub current: Vec<QuotaUsageReport>,
    pub generated_at: DateTime<Utc>,
}

/// Captures and reports usage snapshots.
pub struct UsageLogger {
    store: Arc<dyn TenantStore>,
    thresholds: QuotaAlertConfig,
    activity_window: Duration,
}

impl UsageLogger {
    pub fn new(store: Arc<dyn TenantStore>, thresholds: QuotaAlertConfig, config: UsageLogConfig) -> Self {
        Self {
            store,
            thresholds,
            activity_window: Duration::hours(config.activity_window_hours as i64),
        }
    }

    /// Append a snapshot of the organization's current counters.
    pub async fn log_usage(&self, org_id: OrgId, log_type: UsageLogType) -> Result<UsageLogEntry> {
        let org = self
            .store
            .get_org(org_id)
            .await?
            .ok_or_else(|| TenantError::NotFound(org_id.to_string()))?;

        let now = Utc::now();
        let members = self.store.list_members(org_id).await?;
        let active_members = members
            .iter()
            .filter(|m: &&Member| m.deleted_at.is_none() && m.is_recently_active(self.activity_window, now))
            .count() as u64;

        let mut counters = HashMap::new();
        let mut limits = HashMap::new();
        for kind in ResourceKind::ALL {
            counters.insert(kind, org.usage_of(kind));
            limits.insert(kind, org.limit_of(kind));
        }

        let entry = UsageLogEntry {
            id: Uuid::new_v4(),
            organization_id: org_id,
            log_type,
            counters,
            limits,
            active_members,
            recorded_at: now,
        };
        self.store.append_usage_entry(&entry).await?;

        info!(
            org_id = %org_id,
            log_type = %log_type.as_str(),
            active_members = active_members,
            "Recorded usage snapshot"
        );
        Ok(entry)
    }

    /// Snapshots within `[start, end)` in chronological order, plus the
    /// live counter state. Read-only.
    pub async fn report(
        &self,
        org_id: OrgId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<UsageReport> {
        let org = self
            .store
            .get_org(org_id)
            .await?
            .ok_or_else(|| TenantError::NotFound(org_id.to_string()))?;

        let entries = self.store.usage_entries_between(org_id, start, end).await?;

        Ok(UsageReport {
            organization_id: org_id,
            entries,
            current: usage_reports(&org, &self.thresholds),
            generated_at: Utc::now(),
        })
    }
}

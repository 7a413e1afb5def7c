//! Core organization (tenant) model
//!
//! The organization record owns its quota and usage state; every other
//! business record in the platform belongs to exactly one organization.

use crate::quota::{QuotaTable, ResourceKind};
use campus_core::{MemberId, OrgId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Trial length applied at creation for tiers with a trial concept
pub const TRIAL_PERIOD_DAYS: i64 = 30;

/// Organization lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgStatus {
    /// Created but not yet verified or provisioned
    Pending,
    /// In trial period
    Trial,
    /// Fully operational
    Active,
    /// Deactivated for quota/billing violations; can be reinstated
    Suspended,
    /// Terminal; no outgoing transitions
    Cancelled,
}

impl Default for OrgStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl OrgStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Trial => "trial",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the lifecycle permits moving from `self` to `to`.
    ///
    /// `Cancelled` is absorbing: nothing leaves it, not even a
    /// re-cancellation.
    pub fn can_transition_to(&self, to: OrgStatus) -> bool {
        use OrgStatus::*;
        match (self, to) {
            (Cancelled, _) => false,
            (_, Cancelled) => true,
            (Pending, Trial) | (Pending, Active) => true,
            (Trial, Active) => true,
            (Active, Suspended) => true,
            (Suspended, Active) => true,
            _ => false,
        }
    }

    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Active | Self::Trial)
    }
}

impl std::fmt::Display for OrgStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    /// Free tier with tight limits
    Free,
    /// Starter tier for small schools
    Starter,
    /// Professional tier
    Professional,
    /// Enterprise tier with negotiated onboarding
    Enterprise,
}

impl Default for SubscriptionTier {
    fn default() -> Self {
        Self::Free
    }
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }

    /// Whether organizations on this tier start with a trial window.
    ///
    /// Enterprise contracts are negotiated and verified out-of-band, so
    /// they begin `Pending` rather than `Trial`.
    pub fn has_trial(&self) -> bool {
        !matches!(self, Self::Enterprise)
    }

    /// Default maximum member count
    pub fn default_max_users(&self) -> u64 {
        match self {
            Self::Free => 5,
            Self::Starter => 25,
            Self::Professional => 100,
            Self::Enterprise => 1_000,
        }
    }

    /// Default maximum class count
    pub fn default_max_classes(&self) -> u64 {
        match self {
            Self::Free => 10,
            Self::Starter => 50,
            Self::Professional => 250,
            Self::Enterprise => 5_000,
        }
    }

    /// Default storage limit in bytes
    pub fn default_storage_limit(&self) -> u64 {
        match self {
            Self::Free => 100 * 1024 * 1024,               // 100 MB
            Self::Starter => 1024 * 1024 * 1024,           // 1 GB
            Self::Professional => 10 * 1024 * 1024 * 1024, // 10 GB
            Self::Enterprise => 1024 * 1024 * 1024 * 1024, // 1 TB
        }
    }

    /// Default monthly API call limit
    pub fn default_api_calls_limit(&self) -> u64 {
        match self {
            Self::Free => 1_000,
            Self::Starter => 10_000,
            Self::Professional => 100_000,
            Self::Enterprise => 10_000_000,
        }
    }

    /// Default maximum live session count
    pub fn default_max_sessions(&self) -> u64 {
        match self {
            Self::Free => 25,
            Self::Starter => 100,
            Self::Professional => 500,
            Self::Enterprise => 10_000,
        }
    }

    /// Features enabled out of the box for this tier
    pub fn default_features(&self) -> &'static [&'static str] {
        match self {
            Self::Free => &["gradebook"],
            Self::Starter => &["gradebook", "api_access"],
            Self::Professional => &["gradebook", "api_access", "video_sessions", "custom_branding"],
            Self::Enterprise => &[
                "gradebook",
                "api_access",
                "video_sessions",
                "custom_branding",
                "sso",
                "priority_support",
            ],
        }
    }
}

/// Organization (tenant) entity
///
/// The `slug` is assigned at creation and never changes implicitly; it is
/// the stable URL-safe identifier other subsystems key on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub slug: String,
    pub status: OrgStatus,
    pub tier: SubscriptionTier,
    /// Per-resource ceilings, sized by tier (customizable afterwards)
    pub limits: QuotaTable,
    /// Current usage counters; invariant `usage[k] <= limits[k]` holds
    /// after every committed operation
    pub usage: HashMap<ResourceKind, u64>,
    pub trial_started_at: Option<DateTime<Utc>>,
    pub trial_expires_at: Option<DateTime<Utc>>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    /// Free-form settings bag
    pub settings: HashMap<String, serde_json::Value>,
    /// Feature flags
    pub features: HashMap<String, bool>,
    pub verified: bool,
    pub active: bool,
    pub created_by: MemberId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Organization {
    /// Create a new organization on the given tier.
    ///
    /// Tiers with a trial concept start `Trial` with a 30-day window;
    /// the rest start `Pending` until provisioning completes.
    pub fn new(name: &str, slug: &str, tier: SubscriptionTier, created_by: MemberId) -> Self {
        let now = Utc::now();
        let (status, trial_started_at, trial_expires_at) = if tier.has_trial() {
            (
                OrgStatus::Trial,
                Some(now),
                Some(now + chrono::Duration::days(TRIAL_PERIOD_DAYS)),
            )
        } else {
            (OrgStatus::Pending, None, None)
        };

        Self {
            id: OrgId::new(),
            name: name.to_string(),
            slug: slug.to_string(),
            status,
            tier,
            limits: QuotaTable::for_tier(tier),
            usage: HashMap::new(),
            trial_started_at,
            trial_expires_at,
            current_period_start: None,
            current_period_end: None,
            settings: HashMap::new(),
            features: HashMap::new(),
            verified: false,
            active: true,
            created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Current usage for a resource kind
    pub fn usage_of(&self, kind: ResourceKind) -> u64 {
        self.usage.get(&kind).copied().unwrap_or(0)
    }

    /// Ceiling for a resource kind
    pub fn limit_of(&self, kind: ResourceKind) -> u64 {
        self.limits.get(kind)
    }

    /// Whether the organization can serve requests right now.
    ///
    /// Trial expiry is checked lazily here rather than swept by a job.
    pub fn is_operational(&self) -> bool {
        if !self.active || self.deleted_at.is_some() || !self.status.is_operational() {
            return false;
        }

        if self.status == OrgStatus::Trial {
            if let Some(trial_ends) = self.trial_expires_at {
                if Utc::now() > trial_ends {
                    return false;
                }
            }
        }

        true
    }

    /// Check if a feature is enabled
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.get(feature).copied().unwrap_or(false)
    }

    /// Enable a feature
    pub fn enable_feature(&mut self, feature: &str) {
        self.features.insert(feature.to_string(), true);
        self.touch();
    }

    /// Disable a feature
    pub fn disable_feature(&mut self, feature: &str) {
        self.features.insert(feature.to_string(), false);
        self.touch();
    }

    /// Bump the audit timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

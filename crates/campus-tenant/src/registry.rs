//! Organization registry
//!
//! CRUD for the tenant entity itself: slug assignment and collision
//! resolution, partial updates, and the status state machine.

use crate::organization::{Organization, OrgStatus, SubscriptionTier};
use crate::store::TenantStore;
use crate::{Result, TenantError};
use campus_core::{MemberId, OrgId};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Request to create an organization
#[derive(Debug, Clone)]
pub struct CreateOrganization {
    pub name: String,
    /// Optional preferred slug; falls back to the name
    pub desired_slug: Option<String>,
    pub tier: SubscriptionTier,
    pub created_by: MemberId,
}

impl CreateOrganization {
    pub fn new(name: &str, tier: SubscriptionTier, created_by: MemberId) -> Self {
        Self {
            name: name.to_string(),
            desired_slug: None,
            tier,
            created_by,
        }
    }

    pub fn with_slug(mut self, slug: &str) -> Self {
        self.desired_slug = Some(slug.to_string());
        self
    }
}

/// Partial update; only supplied fields are merged.
///
/// The slug is deliberately absent: it never changes implicitly.
#[derive(Debug, Clone, Default)]
pub struct OrganizationUpdate {
    pub name: Option<String>,
    pub settings: Option<HashMap<String, serde_json::Value>>,
    pub features: Option<HashMap<String, bool>>,
    pub verified: Option<bool>,
    pub active: Option<bool>,
}

/// Registry of all organizations on the platform.
pub struct TenantRegistry {
    store: Arc<dyn TenantStore>,
}

impl TenantRegistry {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self { store }
    }

    /// Create an organization.
    ///
    /// The requested slug is normalized and, when taken, suffixed with an
    /// incrementing number until unique; name collisions never fail.
    pub async fn create(&self, request: CreateOrganization) -> Result<Organization> {
        let raw = request
            .desired_slug
            .as_deref()
            .unwrap_or(request.name.as_str());
        let slug = self.resolve_slug(&normalize_slug(raw)).await?;

        let org = Organization::new(&request.name, &slug, request.tier, request.created_by);
        self.store.insert_org(&org).await?;

        info!(
            org_id = %org.id,
            name = %org.name,
            slug = %slug,
            tier = %org.tier.as_str(),
            status = %org.status,
            "Created organization"
        );
        Ok(org)
    }

    async fn resolve_slug(&self, base: &str) -> Result<String> {
        if self.store.get_org_by_slug(base).await?.is_none() {
            return Ok(base.to_string());
        }

        let mut suffix = 1u32;
        loop {
            let candidate = format!("{}-{}", base, suffix);
            if self.store.get_org_by_slug(&candidate).await?.is_none() {
                debug!(base = %base, resolved = %candidate, "Resolved slug collision");
                return Ok(candidate);
            }
            suffix += 1;
        }
    }

    pub async fn get(&self, id: OrgId) -> Result<Organization> {
        self.store
            .get_org(id)
            .await?
            .filter(|o| o.deleted_at.is_none())
            .ok_or_else(|| TenantError::NotFound(id.to_string()))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Organization> {
        self.store
            .get_org_by_slug(slug)
            .await?
            .filter(|o| o.deleted_at.is_none())
            .ok_or_else(|| TenantError::NotFound(slug.to_string()))
    }

    pub async fn list(&self, offset: usize, limit: usize) -> Result<Vec<Organization>> {
        Ok(self
            .store
            .list_orgs(offset, limit)
            .await?
            .into_iter()
            .filter(|o| o.deleted_at.is_none())
            .collect())
    }

    /// Merge supplied fields into the record and bump `updated_at`.
    pub async fn update(&self, id: OrgId, update: OrganizationUpdate) -> Result<Organization> {
        let mut org = self.get(id).await?;

        if let Some(name) = update.name {
            org.name = name;
        }
        if let Some(settings) = update.settings {
            org.settings.extend(settings);
        }
        if let Some(features) = update.features {
            org.features.extend(features);
        }
        if let Some(verified) = update.verified {
            org.verified = verified;
        }
        if let Some(active) = update.active {
            org.active = active;
        }

        org.touch();
        self.store.update_org(&org).await?;
        Ok(org)
    }

    /// Transition the lifecycle status.
    ///
    /// Illegal transitions fail with `InvalidStatusTransition` and leave
    /// the record untouched.
    pub async fn set_status(&self, id: OrgId, new_status: OrgStatus) -> Result<Organization> {
        let mut org = self.get(id).await?;

        if !org.status.can_transition_to(new_status) {
            warn!(
                org_id = %id,
                from = %org.status,
                to = %new_status,
                "Rejected status transition"
            );
            return Err(TenantError::InvalidStatusTransition {
                from: org.status,
                to: new_status,
            });
        }

        let from = org.status;
        org.status = new_status;
        if new_status == OrgStatus::Active && from == OrgStatus::Trial {
            // Conversion ends the trial window
            org.trial_expires_at = Some(Utc::now());
        }
        org.touch();
        self.store.update_org(&org).await?;

        info!(org_id = %id, from = %from, to = %new_status, "Organization status changed");
        Ok(org)
    }

    /// Physically remove an organization and its owned records.
    pub async fn purge(&self, id: OrgId) -> Result<()> {
        warn!(org_id = %id, "Purging organization (destructive operation)");
        self.store.delete_org(id).await
    }
}

/// Normalize a requested slug: lowercase, alphanumeric and hyphens only,
/// runs of other characters collapsed to a single hyphen.
pub fn normalize_slug(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut last_was_hyphen = true; // suppress leading hyphens

    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

//! Members and their organization assignment
//!
//! A member references at most one organization but is not owned by it;
//! deleting an organization clears the reference without touching the
//! member record.

use crate::quota::{QuotaEnforcer, ResourceKind};
use crate::store::TenantStore;
use crate::{Result, TenantError};
use campus_core::{MemberId, OrgId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Role within an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
    /// Owner with full access
    Owner,
    /// Admin with management access
    Admin,
    /// Teaching staff
    Teacher,
    /// Standard member
    Member,
}

impl OrgRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Member => "member",
        }
    }

    pub fn can_manage_members(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }

    pub fn can_modify_settings(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }

    pub fn can_delete_org(&self) -> bool {
        matches!(self, Self::Owner)
    }
}

impl std::fmt::Display for OrgRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    /// Normalized lower-case address
    pub email: String,
    pub display_name: String,
    pub organization_id: Option<OrgId>,
    pub org_role: Option<OrgRole>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Member {
    pub fn new(email: &str, display_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: MemberId::new(),
            email: email.trim().to_lowercase(),
            display_name: display_name.to_string(),
            organization_id: None,
            org_role: None,
            last_active_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether the member was active within the given window ending now.
    pub fn is_recently_active(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.last_active_at
            .map(|at| now - at <= window)
            .unwrap_or(false)
    }
}

/// Membership operations gated by the users quota.
pub struct MemberDirectory {
    store: Arc<dyn TenantStore>,
    quota: Arc<QuotaEnforcer>,
}

impl MemberDirectory {
    pub fn new(store: Arc<dyn TenantStore>, quota: Arc<QuotaEnforcer>) -> Self {
        Self { store, quota }
    }

    /// Create a member directly inside an organization.
    ///
    /// The users counter moves with the insert inside one unit of work.
    pub async fn create_in_org(
        &self,
        org_id: OrgId,
        email: &str,
        display_name: &str,
        role: OrgRole,
    ) -> Result<Member> {
        let normalized = email.trim().to_lowercase();
        if let Some(existing) = self.store.get_member_by_email(&normalized).await? {
            if existing.organization_id == Some(org_id) {
                // Already present; a retried setup must not add a second row
                return Ok(existing);
            }
        }

        let txn = self.store.begin().await?;

        let result = async {
            self.quota.try_increment(org_id, ResourceKind::Users, 1).await?;

            let mut member = Member::new(email, display_name);
            member.organization_id = Some(org_id);
            member.org_role = Some(role);
            self.store.insert_member(&member).await?;
            Ok(member)
        }
        .await;

        match result {
            Ok(member) => {
                txn.commit().await.map_err(TenantError::from)?;
                info!(org_id = %org_id, member_id = %member.id, role = %role, "Created member in organization");
                Ok(member)
            }
            Err(e) => {
                txn.rollback().await.map_err(TenantError::from)?;
                Err(e)
            }
        }
    }

    pub async fn get(&self, id: MemberId) -> Result<Member> {
        self.store
            .get_member(id)
            .await?
            .ok_or_else(|| TenantError::NotFound(id.to_string()))
    }

    /// Move a member to another organization.
    ///
    /// One atomic operation: the old organization's users counter is
    /// decremented and the new one's incremented (ceiling-checked), or
    /// neither happens.
    pub async fn reassign(&self, member_id: MemberId, new_org: OrgId, role: OrgRole) -> Result<Member> {
        let txn = self.store.begin().await?;

        let result = async {
            let mut member = self
                .store
                .get_member(member_id)
                .await?
                .ok_or_else(|| TenantError::NotFound(member_id.to_string()))?;

            if let Some(old_org) = member.organization_id {
                if old_org == new_org {
                    return Ok(member);
                }
                self.quota.decrement(old_org, ResourceKind::Users, 1).await?;
            }

            self.quota.try_increment(new_org, ResourceKind::Users, 1).await?;

            member.organization_id = Some(new_org);
            member.org_role = Some(role);
            member.updated_at = Utc::now();
            self.store.update_member(&member).await?;
            Ok(member)
        }
        .await;

        match result {
            Ok(member) => {
                txn.commit().await.map_err(TenantError::from)?;
                debug!(member_id = %member_id, new_org = %new_org, "Reassigned member");
                Ok(member)
            }
            Err(e) => {
                txn.rollback().await.map_err(TenantError::from)?;
                Err(e)
            }
        }
    }

    /// Record activity for the usage logger's recent-activity window.
    pub async fn touch_activity(&self, member_id: MemberId) -> Result<()> {
        let mut member = self.get(member_id).await?;
        member.last_active_at = Some(Utc::now());
        self.store.update_member(&member).await?;
        Ok(())
    }

    pub async fn list(&self, org_id: OrgId) -> Result<Vec<Member>> {
        self.store.list_members(org_id).await
    }

    /// Count members active within the window ending now.
    pub async fn recently_active_count(&self, org_id: OrgId, window: Duration) -> Result<u64> {
        let now = Utc::now();
        let members = self.store.list_members(org_id).await?;
        Ok(members
            .iter()
            .filter(|m| m.deleted_at.is_none() && m.is_recently_active(window, now))
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organization::{Organization, SubscriptionTier};
    use crate::store::InMemoryTenantStore;
    use campus_core::QuotaAlertConfig;

    struct Fixture {
        store: Arc<InMemoryTenantStore>,
        directory: MemberDirectory,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryTenantStore::new());
        let quota = Arc::new(QuotaEnforcer::new(store.clone(), QuotaAlertConfig::default()));
        let directory = MemberDirectory::new(store.clone(), quota);
        Fixture { store, directory }
    }

    async fn make_org(fx: &Fixture, name: &str, slug: &str) -> Organization {
        let org = Organization::new(name, slug, SubscriptionTier::Free, MemberId::new());
        fx.store.insert_org(&org).await.unwrap();
        org
    }

    #[test]
    fn test_role_permissions() {
        assert!(OrgRole::Owner.can_manage_members());
        assert!(OrgRole::Admin.can_manage_members());
        assert!(!OrgRole::Teacher.can_manage_members());
        assert!(!OrgRole::Member.can_manage_members());

        assert!(OrgRole::Owner.can_delete_org());
        assert!(!OrgRole::Admin.can_delete_org());
    }

    #[test]
    fn test_email_normalized() {
        let member = Member::new("  Admin@School.EDU ", "Admin");
        assert_eq!(member.email, "admin@school.edu");
    }

    #[tokio::test]
    async fn test_create_in_org_moves_counter() {
        let fx = fixture().await;
        let org = make_org(&fx, "Acme", "acme").await;

        let member = fx
            .directory
            .create_in_org(org.id, "a@acme.edu", "A", OrgRole::Admin)
            .await
            .unwrap();
        assert_eq!(member.organization_id, Some(org.id));

        let stored = fx.store.get_org(org.id).await.unwrap().unwrap();
        assert_eq!(stored.usage_of(ResourceKind::Users), 1);
    }

    #[tokio::test]
    async fn test_create_in_org_fails_when_full() {
        let fx = fixture().await;
        let org = make_org(&fx, "Acme", "acme").await;

        for i in 0..5 {
            fx.directory
                .create_in_org(org.id, &format!("m{}@acme.edu", i), "M", OrgRole::Member)
                .await
                .unwrap();
        }

        let err = fx
            .directory
            .create_in_org(org.id, "extra@acme.edu", "X", OrgRole::Member)
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::QuotaExceeded { .. }));

        // Nothing persisted for the failed create
        assert_eq!(fx.directory.list(org.id).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_reassign_moves_one_unit_between_orgs() {
        let fx = fixture().await;
        let org_a = make_org(&fx, "A", "a").await;
        let org_b = make_org(&fx, "B", "b").await;

        let member = fx
            .directory
            .create_in_org(org_a.id, "m@a.edu", "M", OrgRole::Member)
            .await
            .unwrap();

        fx.directory.reassign(member.id, org_b.id, OrgRole::Teacher).await.unwrap();

        let a = fx.store.get_org(org_a.id).await.unwrap().unwrap();
        let b = fx.store.get_org(org_b.id).await.unwrap().unwrap();
        assert_eq!(a.usage_of(ResourceKind::Users), 0);
        assert_eq!(b.usage_of(ResourceKind::Users), 1);

        let moved = fx.directory.get(member.id).await.unwrap();
        assert_eq!(moved.organization_id, Some(org_b.id));
        assert_eq!(moved.org_role, Some(OrgRole::Teacher));
    }

    #[tokio::test]
    async fn test_reassign_rolls_back_when_target_is_full() {
        let fx = fixture().await;
        let org_a = make_org(&fx, "A", "a").await;
        let org_b = make_org(&fx, "B", "b").await;

        for i in 0..5 {
            fx.directory
                .create_in_org(org_b.id, &format!("m{}@b.edu", i), "M", OrgRole::Member)
                .await
                .unwrap();
        }
        let member = fx
            .directory
            .create_in_org(org_a.id, "m@a.edu", "M", OrgRole::Member)
            .await
            .unwrap();

        let err = fx.directory.reassign(member.id, org_b.id, OrgRole::Member).await.unwrap_err();
        assert!(matches!(err, TenantError::QuotaExceeded { .. }));

        // The decrement on A was rolled back with the rest of the work
        let a = fx.store.get_org(org_a.id).await.unwrap().unwrap();
        assert_eq!(a.usage_of(ResourceKind::Users), 1);
        let unchanged = fx.directory.get(member.id).await.unwrap();
        assert_eq!(unchanged.organization_id, Some(org_a.id));
    }

    #[tokio::test]
    async fn test_recently_active_count() {
        let fx = fixture().await;
        let org = make_org(&fx, "Acme", "acme").await;

        let fresh = fx
            .directory
            .create_in_org(org.id, "fresh@acme.edu", "F", OrgRole::Member)
            .await
            .unwrap();
        let stale = fx
            .directory
            .create_in_org(org.id, "stale@acme.edu", "S", OrgRole::Member)
            .await
            .unwrap();

        fx.directory.touch_activity(fresh.id).await.unwrap();

        let mut stale_member = fx.directory.get(stale.id).await.unwrap();
        stale_member.last_active_at = Some(Utc::now() - Duration::days(3));
        fx.store.update_member(&stale_member).await.unwrap();

        let count = fx
            .directory
            .recently_active_count(org.id, Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}

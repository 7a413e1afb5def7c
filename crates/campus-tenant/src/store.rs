//! Storage seam for tenant records
//!
//! One trait covers the records the tenant subsystem owns directly:
//! organizations, members, invitations, and usage log entries. A real
//! deployment backs this with the platform's transactional store; the
//! in-memory implementation here backs tests and local development.

use crate::invitation::Invitation;
use crate::member::Member;
use crate::organization::Organization;
use crate::usage_log::UsageLogEntry;
use crate::{Result, TenantError};
use async_trait::async_trait;
use campus_core::traits::Transaction;
use campus_core::{InvitationId, MemberId, OrgId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Record store for the tenant subsystem.
///
/// Transient connectivity failures are retried by the implementation;
/// errors surfacing here are final.
#[async_trait]
pub trait TenantStore: Send + Sync {
    // Organizations
    async fn insert_org(&self, org: &Organization) -> Result<()>;
    async fn get_org(&self, id: OrgId) -> Result<Option<Organization>>;
    async fn get_org_by_slug(&self, slug: &str) -> Result<Option<Organization>>;
    async fn update_org(&self, org: &Organization) -> Result<()>;
    /// Physically remove an organization and everything it owns
    /// (invitations, usage log entries). Member records survive with
    /// their assignment cleared.
    async fn delete_org(&self, id: OrgId) -> Result<()>;
    async fn list_orgs(&self, offset: usize, limit: usize) -> Result<Vec<Organization>>;

    // Members
    async fn insert_member(&self, member: &Member) -> Result<()>;
    async fn get_member(&self, id: MemberId) -> Result<Option<Member>>;
    async fn get_member_by_email(&self, email: &str) -> Result<Option<Member>>;
    async fn update_member(&self, member: &Member) -> Result<()>;
    async fn list_members(&self, org_id: OrgId) -> Result<Vec<Member>>;

    // Invitations
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<()>;
    async fn get_invitation_by_token(&self, token: &str) -> Result<Option<Invitation>>;
    async fn update_invitation(&self, invitation: &Invitation) -> Result<()>;
    async fn list_invitations(&self, org_id: OrgId) -> Result<Vec<Invitation>>;

    // Usage log (append-only)
    async fn append_usage_entry(&self, entry: &UsageLogEntry) -> Result<()>;
    async fn usage_entries_between(
        &self,
        org_id: OrgId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageLogEntry>>;

    /// Open a unit of work spanning subsequent calls on this store.
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}

#[derive(Debug, Clone, Default)]
struct StoreInner {
    orgs: HashMap<OrgId, Organization>,
    members: HashMap<MemberId, Member>,
    invitations: HashMap<InvitationId, Invitation>,
    token_index: HashMap<String, InvitationId>,
    usage: Vec<UsageLogEntry>,
}

/// In-memory tenant store for testing.
///
/// All record families live under one lock, so the snapshot transaction
/// covers every table at once.
#[derive(Debug, Default)]
pub struct InMemoryTenantStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn insert_org(&self, org: &Organization) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.orgs.contains_key(&org.id) {
            return Err(TenantError::Storage(format!("organization {} already exists", org.id)));
        }
        if inner.orgs.values().any(|o| o.slug == org.slug) {
            return Err(TenantError::DuplicateSlug(org.slug.clone()));
        }
        inner.orgs.insert(org.id, org.clone());
        Ok(())
    }

    async fn get_org(&self, id: OrgId) -> Result<Option<Organization>> {
        Ok(self.inner.read().orgs.get(&id).cloned())
    }

    async fn get_org_by_slug(&self, slug: &str) -> Result<Option<Organization>> {
        Ok(self.inner.read().orgs.values().find(|o| o.slug == slug).cloned())
    }

    async fn update_org(&self, org: &Organization) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.orgs.contains_key(&org.id) {
            return Err(TenantError::NotFound(org.id.to_string()));
        }
        inner.orgs.insert(org.id, org.clone());
        Ok(())
    }

    async fn delete_org(&self, id: OrgId) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.orgs.remove(&id).is_none() {
            return Err(TenantError::NotFound(id.to_string()));
        }

        // Owned records cascade
        let doomed: Vec<InvitationId> = inner
            .invitations
            .values()
            .filter(|i| i.organization_id == id)
            .map(|i| i.id)
            .collect();
        for inv_id in doomed {
            if let Some(inv) = inner.invitations.remove(&inv_id) {
                inner.token_index.remove(&inv.token);
            }
        }
        inner.usage.retain(|e| e.organization_id != id);

        // Members are referenced, not owned: keep them, clear the link
        for member in inner.members.values_mut() {
            if member.organization_id == Some(id) {
                member.organization_id = None;
                member.org_role = None;
            }
        }

        Ok(())
    }

    async fn list_orgs(&self, offset: usize, limit: usize) -> Result<Vec<Organization>> {
        Ok(self
            .inner
            .read()
            .orgs
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_member(&self, member: &Member) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.members.contains_key(&member.id) {
            return Err(TenantError::Storage(format!("member {} already exists", member.id)));
        }
        inner.members.insert(member.id, member.clone());
        Ok(())
    }

    async fn get_member(&self, id: MemberId) -> Result<Option<Member>> {
        Ok(self.inner.read().members.get(&id).cloned())
    }

    async fn get_member_by_email(&self, email: &str) -> Result<Option<Member>> {
        Ok(self
            .inner
            .read()
            .members
            .values()
            .find(|m| m.email == email)
            .cloned())
    }

    async fn update_member(&self, member: &Member) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.members.contains_key(&member.id) {
            return Err(TenantError::NotFound(member.id.to_string()));
        }
        inner.members.insert(member.id, member.clone());
        Ok(())
    }

    async fn list_members(&self, org_id: OrgId) -> Result<Vec<Member>> {
        Ok(self
            .inner
            .read()
            .members
            .values()
            .filter(|m| m.organization_id == Some(org_id))
            .cloned()
            .collect())
    }

    async fn insert_invitation(&self, invitation: &Invitation) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.token_index.contains_key(&invitation.token) {
            return Err(TenantError::Storage("invitation token collision".to_string()));
        }
        inner.token_index.insert(invitation.token.clone(), invitation.id);
        inner.invitations.insert(invitation.id, invitation.clone());
        Ok(())
    }

    async fn get_invitation_by_token(&self, token: &str) -> Result<Option<Invitation>> {
        let inner = self.inner.read();
        Ok(inner
            .token_index
            .get(token)
            .and_then(|id| inner.invitations.get(id))
            .cloned())
    }

    async fn update_invitation(&self, invitation: &Invitation) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.invitations.contains_key(&invitation.id) {
            return Err(TenantError::NotFound(invitation.id.to_string()));
        }
        inner.invitations.insert(invitation.id, invitation.clone());
        Ok(())
    }

    async fn list_invitations(&self, org_id: OrgId) -> Result<Vec<Invitation>> {
        Ok(self
            .inner
            .read()
            .invitations
            .values()
            .filter(|i| i.organization_id == org_id)
            .cloned()
            .collect())
    }

    async fn append_usage_entry(&self, entry: &UsageLogEntry) -> Result<()> {
        self.inner.write().usage.push(entry.clone());
        Ok(())
    }

    async fn usage_entries_between(
        &self,
        org_id: OrgId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageLogEntry>> {
        let mut entries: Vec<UsageLogEntry> = self
            .inner
            .read()
            .usage
            .iter()
            .filter(|e| e.organization_id == org_id && e.recorded_at >= start && e.recorded_at < end)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.recorded_at);
        Ok(entries)
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let snapshot = self.inner.read().clone();
        Ok(Box::new(InMemoryTransaction {
            inner: self.inner.clone(),
            snapshot,
        }))
    }
}

/// Snapshot-based transaction: rollback restores the state captured at
/// `begin`. Adequate for the serialized units of work exercised in tests.
struct InMemoryTransaction {
    inner: Arc<RwLock<StoreInner>>,
    snapshot: StoreInner,
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn commit(self: Box<Self>) -> campus_core::error::Result<()> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> campus_core::error::Result<()> {
        *self.inner.write() = self.snapshot;
        Ok(())
    }
}

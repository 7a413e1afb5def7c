//! Token-based membership invitations
//!
//! An invitation is owned by one organization and resolves at most once:
//! exactly one of the accepted/declined/cancelled timestamps may ever be
//! set. Expiry is checked lazily when a token is used; nothing sweeps
//! expired rows.

use crate::member::{Member, OrgRole};
use crate::organization::Organization;
use crate::quota::{QuotaEnforcer, ResourceKind};
use crate::store::TenantStore;
use crate::{Result, TenantError};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use campus_core::{InvitationId, MemberId, OrgId};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Membership invitation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub organization_id: OrgId,
    /// Normalized lower-case address
    pub email: String,
    pub role: OrgRole,
    pub invited_by: MemberId,
    /// Opaque unguessable credential; single-use
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Invitation {
    pub fn new(org_id: OrgId, email: &str, role: OrgRole, invited_by: MemberId, ttl_days: u32) -> Self {
        let now = Utc::now();
        Self {
            id: InvitationId::new(),
            organization_id: org_id,
            email: email.trim().to_lowercase(),
            role,
            invited_by,
            token: generate_token(),
            expires_at: now + Duration::days(ttl_days as i64),
            created_at: now,
            accepted_at: None,
            declined_at: None,
            cancelled_at: None,
        }
    }

    /// The terminal state, if any.
    pub fn resolution(&self) -> Option<&'static str> {
        if self.accepted_at.is_some() {
            Some("accepted")
        } else if self.declined_at.is_some() {
            Some("declined")
        } else if self.cancelled_at.is_some() {
            Some("cancelled")
        } else {
            None
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution().is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    fn mark(&mut self, terminal: Terminal) -> Result<()> {
        if let Some(kind) = self.resolution() {
            return Err(TenantError::AlreadyResolved(kind));
        }
        let now = Utc::now();
        match terminal {
            Terminal::Accepted => self.accepted_at = Some(now),
            Terminal::Declined => self.declined_at = Some(now),
            Terminal::Cancelled => self.cancelled_at = Some(now),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Terminal {
    Accepted,
    Declined,
    Cancelled,
}

/// 32 random bytes, URL-safe encoded. 256 bits from the OS-seeded CSPRNG
/// makes the token unguessable.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Invitation lifecycle operations, gated by the users quota.
pub struct InvitationManager {
    store: Arc<dyn TenantStore>,
    quota: Arc<QuotaEnforcer>,
    ttl_days: u32,
}

impl InvitationManager {
    pub fn new(store: Arc<dyn TenantStore>, quota: Arc<QuotaEnforcer>, ttl_days: u32) -> Self {
        Self { store, quota, ttl_days }
    }

    async fn load_org(&self, org_id: OrgId) -> Result<Organization> {
        self.store
            .get_org(org_id)
            .await?
            .ok_or_else(|| TenantError::NotFound(org_id.to_string()))
    }

    /// Create an invitation.
    ///
    /// Fails before anything is persisted when the organization has no
    /// headroom for another member; the counter itself only moves when
    /// the invitation is accepted.
    pub async fn invite(
        &self,
        org_id: OrgId,
        email: &str,
        role: OrgRole,
        invited_by: MemberId,
    ) -> Result<Invitation> {
        let org = self.load_org(org_id).await?;
        if !org.is_operational() {
            return Err(TenantError::NotOperational(org_id));
        }

        let current = org.usage_of(ResourceKind::Users);
        let limit = org.limit_of(ResourceKind::Users);
        if current >= limit {
            warn!(org_id = %org_id, current = current, limit = limit, "Invitation rejected: users quota full");
            return Err(TenantError::QuotaExceeded {
                kind: ResourceKind::Users,
                current,
                requested: 1,
                limit,
            });
        }

        let invitation = Invitation::new(org_id, email, role, invited_by, self.ttl_days);
        self.store.insert_invitation(&invitation).await?;

        info!(
            org_id = %org_id,
            invitation_id = %invitation.id,
            email = %invitation.email,
            role = %role,
            "Created invitation"
        );
        Ok(invitation)
    }

    async fn load_unresolved(&self, token: &str) -> Result<Invitation> {
        let invitation = self
            .store
            .get_invitation_by_token(token)
            .await?
            .ok_or(TenantError::InvalidToken)?;

        if let Some(kind) = invitation.resolution() {
            return Err(TenantError::AlreadyResolved(kind));
        }
        if invitation.is_expired(Utc::now()) {
            return Err(TenantError::ExpiredInvitation(invitation.expires_at));
        }
        Ok(invitation)
    }

    /// Accept an invitation.
    ///
    /// Membership assignment, the users counter, and the terminal
    /// timestamp move inside one unit of work; a half-applied acceptance
    /// is never observable.
    pub async fn accept(&self, token: &str, display_name: &str) -> Result<Member> {
        let mut invitation = self.load_unresolved(token).await?;
        let org = self.load_org(invitation.organization_id).await?;
        if !org.is_operational() {
            return Err(TenantError::NotOperational(org.id));
        }

        let txn = self.store.begin().await?;

        let result = async {
            let existing = self.store.get_member_by_email(&invitation.email).await?;
            let is_new = existing.is_none();
            let mut member = match existing {
                Some(m) => m,
                None => Member::new(&invitation.email, display_name),
            };

            match member.organization_id {
                Some(current_org) if current_org == org.id => {
                    // Already a member; only the role may change
                }
                Some(other_org) => {
                    self.quota.decrement(other_org, ResourceKind::Users, 1).await?;
                    self.quota.try_increment(org.id, ResourceKind::Users, 1).await?;
                }
                None => {
                    self.quota.try_increment(org.id, ResourceKind::Users, 1).await?;
                }
            }

            member.organization_id = Some(org.id);
            member.org_role = Some(invitation.role);
            member.updated_at = Utc::now();
            if is_new {
                self.store.insert_member(&member).await?;
            } else {
                self.store.update_member(&member).await?;
            }

            invitation.mark(Terminal::Accepted)?;
            self.store.update_invitation(&invitation).await?;
            Ok(member)
        }
        .await;

        match result {
            Ok(member) => {
                txn.commit().await.map_err(TenantError::from)?;
                info!(
                    org_id = %org.id,
                    member_id = %member.id,
                    role = %invitation.role,
                    "Invitation accepted"
                );
                Ok(member)
            }
            Err(e) => {
                txn.rollback().await.map_err(TenantError::from)?;
                Err(e)
            }
        }
    }

    /// Decline an invitation. Same single-terminal-timestamp rule as
    /// `accept`; no membership or counter changes.
    pub async fn decline(&self, token: &str) -> Result<Invitation> {
        let mut invitation = self.load_unresolved(token).await?;
        invitation.mark(Terminal::Declined)?;
        self.store.update_invitation(&invitation).await?;

        info!(org_id = %invitation.organization_id, invitation_id = %invitation.id, "Invitation declined");
        Ok(invitation)
    }

    /// Withdraw an invitation from the organization's side.
    pub async fn cancel(&self, token: &str) -> Result<Invitation> {
        let mut invitation = self.load_unresolved(token).await?;
        invitation.mark(Terminal::Cancelled)?;
        self.store.update_invitation(&invitation).await?;

        info!(org_id = %invitation.organization_id, invitation_id = %invitation.id, "Invitation cancelled");
        Ok(invitation)
    }

    pub async fn list_for_org(&self, org_id: OrgId) -> Result<Vec<Invitation>> {
        self.store.list_invitations(org_id).await
    }
}

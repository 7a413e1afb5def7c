//! Tenant context for units of work
//!
//! Exactly one organization is bound to one logical unit of work (a
//! request, a job run). The runtime multiplexes many tasks over shared
//! executor threads, so the binding is an explicit immutable handle
//! passed through call boundaries rather than thread-ambient state.
//! Release is RAII: dropping the scope ends the binding on every exit
//! path. Rebinding a live scope to a different organization is a
//! programmer error and fails immediately.

use crate::organization::Organization;
use crate::{Result, TenantError};
use campus_core::{MemberId, OrgId};
use tracing::debug;

/// Immutable tenant handle for one unit of work.
#[derive(Debug, Clone)]
pub struct TenantContext {
    org_id: OrgId,
    slug: String,
    cache_prefix: String,
    member_id: Option<MemberId>,
}

impl TenantContext {
    fn new(org_id: OrgId, slug: &str) -> Self {
        Self {
            org_id,
            slug: slug.to_string(),
            cache_prefix: format!("org:{}:", org_id),
            member_id: None,
        }
    }

    pub fn org_id(&self) -> OrgId {
        self.org_id
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// The member acting in this unit of work, when known.
    pub fn member_id(&self) -> Option<MemberId> {
        self.member_id
    }

    pub fn with_member(mut self, member_id: MemberId) -> Self {
        self.member_id = Some(member_id);
        self
    }

    /// Namespaced cache key for this tenant.
    pub fn cache_key(&self, key: &str) -> String {
        format!("{}{}", self.cache_prefix, key)
    }

    /// Assert that `org_id` is the bound tenant.
    ///
    /// The failure is fatal to the operation and must not be caught and
    /// corrected: a mismatch means some call site mixed handles.
    pub fn ensure_org(&self, org_id: OrgId) -> Result<()> {
        if self.org_id != org_id {
            return Err(TenantError::IsolationViolation {
                bound: self.org_id,
                attempted: org_id,
            });
        }
        Ok(())
    }
}

/// Binds a tenant for the duration of one unit of work.
///
/// Dropping the scope releases the binding; this happens on normal
/// return, error propagation, and task cancellation alike.
#[derive(Debug)]
pub struct TenantScope {
    ctx: TenantContext,
}

impl TenantScope {
    /// Enter a scope for an organization.
    pub fn enter(org: &Organization) -> Self {
        debug!(org_id = %org.id, slug = %org.slug, "Entered tenant scope");
        Self {
            ctx: TenantContext::new(org.id, &org.slug),
        }
    }

    /// Enter a scope from raw parts (e.g. a decoded session claim).
    pub fn enter_parts(org_id: OrgId, slug: &str) -> Self {
        debug!(org_id = %org_id, slug = %slug, "Entered tenant scope");
        Self {
            ctx: TenantContext::new(org_id, slug),
        }
    }

    pub fn context(&self) -> &TenantContext {
        &self.ctx
    }

    /// Re-enter the already-bound scope for a nested piece of work.
    ///
    /// Passing the same organization returns the live handle; passing a
    /// different one fails with `IsolationViolation` and the nested work
    /// must not proceed.
    pub fn rebind(&self, org_id: OrgId) -> Result<&TenantContext> {
        self.ctx.ensure_org(org_id)?;
        Ok(&self.ctx)
    }
}

impl Drop for TenantScope {
    fn drop(&mut self) {
        debug!(org_id = %self.ctx.org_id, "Released tenant scope");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organization::SubscriptionTier;

    fn org(slug: &str) -> Organization {
        Organization::new(slug, slug, SubscriptionTier::Free, MemberId::new())
    }

    #[test]
    fn test_scope_carries_org_identity() {
        let org = org("acme");
        let scope = TenantScope::enter(&org);
        let ctx = scope.context();

        assert_eq!(ctx.org_id(), org.id);
        assert_eq!(ctx.slug(), "acme");
        assert_eq!(ctx.cache_key("sessions"), format!("org:{}:sessions", org.id));
    }

    #[test]
    fn test_with_member() {
        let org = org("acme");
        let member = MemberId::new();
        let ctx = TenantScope::enter(&org).context().clone().with_member(member);

        assert_eq!(ctx.member_id(), Some(member));
    }

    #[test]
    fn test_rebind_same_org_succeeds() {
        let org = org("acme");
        let scope = TenantScope::enter(&org);

        assert!(scope.rebind(org.id).is_ok());
    }

    #[test]
    fn test_rebind_different_org_fails_loudly() {
        let org_a = org("a");
        let org_b = org("b");
        let scope = TenantScope::enter(&org_a);

        let err = scope.rebind(org_b.id).unwrap_err();
        match err {
            TenantError::IsolationViolation { bound, attempted } => {
                assert_eq!(bound, org_a.id);
                assert_eq!(attempted, org_b.id);
            }
            other => panic!("expected isolation violation, got {other:?}"),
        }
    }

    #[test]
    fn test_ensure_org_mismatch() {
        let org = org("acme");
        let ctx = TenantScope::enter(&org).context().clone();

        assert!(ctx.ensure_org(org.id).is_ok());
        assert!(ctx.ensure_org(OrgId::new()).is_err());
    }
}

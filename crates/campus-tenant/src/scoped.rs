//! Tenant-scoped data access
//!
//! Generic repository wrapper that injects the tenant filter into every
//! read and write. Callers cannot remove or widen the filter: a record
//! in another organization behaves exactly like a record that does not
//! exist.

use crate::context::TenantContext;
use crate::{Result, TenantError};
use campus_core::traits::{Entity, ListQuery, Predicate, Repository};
use campus_core::OrgId;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// A business entity owned by exactly one organization.
pub trait TenantOwned: Entity {
    fn organization_id(&self) -> Option<OrgId>;
    fn set_organization_id(&mut self, org_id: OrgId);
    fn deleted_at(&self) -> Option<DateTime<Utc>>;
    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>);
}

/// Data access for one entity type, bounded by the active tenant context.
pub struct ScopedRepository<E: TenantOwned> {
    store: Arc<dyn Repository<E>>,
}

impl<E: TenantOwned> ScopedRepository<E> {
    pub fn new(store: Arc<dyn Repository<E>>) -> Self {
        Self { store }
    }

    /// Fetch one record of the bound tenant.
    ///
    /// Records of other tenants and soft-deleted records report
    /// `NotFound`, indistinguishable from a genuinely absent id.
    pub async fn get(&self, ctx: &TenantContext, id: Uuid) -> Result<E> {
        self.store
            .get(id)
            .await?
            .filter(|e| Self::visible(e, ctx.org_id()))
            .ok_or_else(|| TenantError::NotFound(id.to_string()))
    }

    /// List records of the bound tenant.
    ///
    /// The tenant filter is layered under any caller-supplied filter and
    /// cannot be overridden by it.
    pub async fn list(&self, ctx: &TenantContext, mut query: ListQuery<E>) -> Result<Vec<E>> {
        let caller_filter = query.filter.take();
        let org_id = ctx.org_id();
        let combined: Predicate<E> = Arc::new(move |e: &E| {
            Self::visible(e, org_id) && caller_filter.as_ref().map_or(true, |f| f(e))
        });
        query.filter = Some(combined);

        Ok(self.store.find(query).await?)
    }

    /// Insert a record into the bound tenant.
    ///
    /// Any caller-supplied organization id is silently overwritten from
    /// the context.
    pub async fn create(&self, ctx: &TenantContext, mut entity: E) -> Result<E> {
        entity.set_organization_id(ctx.org_id());
        self.store.insert(&entity).await?;
        debug!(org_id = %ctx.org_id(), entity_id = %entity.id(), "Created tenant-scoped record");
        Ok(entity)
    }

    /// Replace a record of the bound tenant.
    ///
    /// Operating on an out-of-tenant id yields `NotFound`.
    pub async fn update(&self, ctx: &TenantContext, mut entity: E) -> Result<E> {
        // Read back through the tenant filter before touching anything
        self.get(ctx, entity.id()).await?;

        entity.set_organization_id(ctx.org_id());
        self.store.update(&entity).await?;
        Ok(entity)
    }

    /// Mark a record deleted without removing it.
    pub async fn soft_delete(&self, ctx: &TenantContext, id: Uuid) -> Result<E> {
        let mut entity = self.get(ctx, id).await?;
        entity.set_deleted_at(Some(Utc::now()));
        self.store.update(&entity).await?;
        debug!(org_id = %ctx.org_id(), entity_id = %id, "Soft-deleted tenant-scoped record");
        Ok(entity)
    }

    /// Clear the soft-delete marker of a record of the bound tenant.
    pub async fn restore(&self, ctx: &TenantContext, id: Uuid) -> Result<E> {
        let mut entity = self
            .store
            .get(id)
            .await?
            .filter(|e| e.organization_id() == Some(ctx.org_id()))
            .ok_or_else(|| TenantError::NotFound(id.to_string()))?;

        entity.set_deleted_at(None);
        self.store.update(&entity).await?;
        Ok(entity)
    }

    fn visible(entity: &E, org_id: OrgId) -> bool {
        entity.organization_id() == Some(org_id) && entity.deleted_at().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TenantScope;
    use crate::organization::{Organization, SubscriptionTier};
    use campus_core::{InMemoryRepository, MemberId};
    use serde::{Deserialize, Serialize};

    /// Representative tenant-owned business entity
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct ClassSection {
        id: Uuid,
        organization_id: Option<OrgId>,
        title: String,
        subject: String,
        deleted_at: Option<DateTime<Utc>>,
    }

    impl ClassSection {
        fn new(title: &str, subject: &str) -> Self {
            Self {
                id: Uuid::new_v4(),
                organization_id: None,
                title: title.to_string(),
                subject: subject.to_string(),
                deleted_at: None,
            }
        }
    }

    impl Entity for ClassSection {
        fn id(&self) -> Uuid {
            self.id
        }
    }

    impl TenantOwned for ClassSection {
        fn organization_id(&self) -> Option<OrgId> {
            self.organization_id
        }

        fn set_organization_id(&mut self, org_id: OrgId) {
            self.organization_id = Some(org_id);
        }

        fn deleted_at(&self) -> Option<DateTime<Utc>> {
            self.deleted_at
        }

        fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>) {
            self.deleted_at = at;
        }
    }

    fn org(slug: &str) -> Organization {
        Organization::new(slug, slug, SubscriptionTier::Free, MemberId::new())
    }

    fn repo() -> ScopedRepository<ClassSection> {
        ScopedRepository::new(Arc::new(InMemoryRepository::new()))
    }

    #[tokio::test]
    async fn test_create_forces_context_org() {
        let repo = repo();
        let org_a = org("a");
        let org_b = org("b");
        let scope = TenantScope::enter(&org_a);

        // Caller claims org B; the context wins silently
        let mut section = ClassSection::new("Algebra", "math");
        section.organization_id = Some(org_b.id);

        let created = repo.create(scope.context(), section).await.unwrap();
        assert_eq!(created.organization_id, Some(org_a.id));
    }

    #[tokio::test]
    async fn test_cross_tenant_reads_report_not_found() {
        let repo = repo();
        let org_a = org("a");
        let org_b = org("b");

        let scope_a = TenantScope::enter(&org_a);
        let section = repo
            .create(scope_a.context(), ClassSection::new("Algebra", "math"))
            .await
            .unwrap();

        // B cannot see, update, or delete A's record
        let scope_b = TenantScope::enter(&org_b);
        assert!(matches!(
            repo.get(scope_b.context(), section.id).await.unwrap_err(),
            TenantError::NotFound(_)
        ));
        assert!(matches!(
            repo.update(scope_b.context(), section.clone()).await.unwrap_err(),
            TenantError::NotFound(_)
        ));
        assert!(matches!(
            repo.soft_delete(scope_b.context(), section.id).await.unwrap_err(),
            TenantError::NotFound(_)
        ));

        // A still sees it untouched
        let intact = repo.get(scope_a.context(), section.id).await.unwrap();
        assert_eq!(intact.title, "Algebra");
    }

    #[tokio::test]
    async fn test_list_is_always_tenant_filtered() {
        let repo = repo();
        let org_a = org("a");
        let org_b = org("b");

        let scope_a = TenantScope::enter(&org_a);
        let scope_b = TenantScope::enter(&org_b);
        repo.create(scope_a.context(), ClassSection::new("Algebra", "math")).await.unwrap();
        repo.create(scope_a.context(), ClassSection::new("Biology", "science")).await.unwrap();
        repo.create(scope_b.context(), ClassSection::new("Chemistry", "science")).await.unwrap();

        let all_a = repo.list(scope_a.context(), ListQuery::default()).await.unwrap();
        assert_eq!(all_a.len(), 2);

        // A caller filter matching everything still cannot cross tenants
        let greedy = ListQuery::default().with_filter(|_: &ClassSection| true);
        let still_a = repo.list(scope_a.context(), greedy).await.unwrap();
        assert_eq!(still_a.len(), 2);

        // Caller filters narrow within the tenant
        let science = ListQuery::default().with_filter(|s: &ClassSection| s.subject == "science");
        let science_a = repo.list(scope_a.context(), science).await.unwrap();
        assert_eq!(science_a.len(), 1);
        assert_eq!(science_a[0].title, "Biology");
    }

    #[tokio::test]
    async fn test_soft_delete_hides_and_restore_revives() {
        let repo = repo();
        let org_a = org("a");
        let scope = TenantScope::enter(&org_a);

        let section = repo
            .create(scope.context(), ClassSection::new("Algebra", "math"))
            .await
            .unwrap();

        repo.soft_delete(scope.context(), section.id).await.unwrap();
        assert!(repo.get(scope.context(), section.id).await.is_err());
        assert!(repo.list(scope.context(), ListQuery::default()).await.unwrap().is_empty());

        let restored = repo.restore(scope.context(), section.id).await.unwrap();
        assert!(restored.deleted_at.is_none());
        assert!(repo.get(scope.context(), section.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_restore_is_tenant_filtered_too() {
        let repo = repo();
        let org_a = org("a");
        let org_b = org("b");

        let scope_a = TenantScope::enter(&org_a);
        let section = repo
            .create(scope_a.context(), ClassSection::new("Algebra", "math"))
            .await
            .unwrap();
        repo.soft_delete(scope_a.context(), section.id).await.unwrap();

        let scope_b = TenantScope::enter(&org_b);
        assert!(matches!(
            repo.restore(scope_b.context(), section.id).await.unwrap_err(),
            TenantError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_update_within_tenant() {
        let repo = repo();
        let org_a = org("a");
        let scope = TenantScope::enter(&org_a);

        let mut section = repo
            .create(scope.context(), ClassSection::new("Algebra", "math"))
            .await
            .unwrap();
        section.title = "Algebra II".to_string();

        let updated = repo.update(scope.context(), section).await.unwrap();
        assert_eq!(updated.title, "Algebra II");
        assert_eq!(
            repo.get(scope.context(), updated.id).await.unwrap().title,
            "Algebra II"
        );
    }
}

//! Collaborator seams: transactional record storage and notification.
//!
//! The platform's business crates depend on these traits only; concrete
//! backends (Postgres, an email gateway) live outside this workspace.
//! In-memory implementations are provided for tests.

use crate::error::Result;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

/// A storable record with a stable identity.
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> Uuid;
}

/// Caller-supplied row filter.
pub type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Caller-supplied row ordering.
pub type Comparator<E> = Arc<dyn Fn(&E, &E) -> Ordering + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Filter, ordering, and pagination for list queries.
///
/// Layers above may wrap this and add mandatory filters of their own;
/// the store applies exactly what it is handed.
pub struct ListQuery<E> {
    pub filter: Option<Predicate<E>>,
    pub order_by: Option<Comparator<E>>,
    pub direction: SortOrder,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl<E> Default for ListQuery<E> {
    fn default() -> Self {
        Self {
            filter: None,
            order_by: None,
            direction: SortOrder::Ascending,
            offset: 0,
            limit: None,
        }
    }
}

impl<E> ListQuery<E> {
    pub fn with_filter(mut self, filter: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_order(
        mut self,
        cmp: impl Fn(&E, &E) -> Ordering + Send + Sync + 'static,
        direction: SortOrder,
    ) -> Self {
        self.order_by = Some(Arc::new(cmp));
        self.direction = direction;
        self
    }

    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }
}

/// Record store for one entity type.
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    /// Fetch a record by id.
    async fn get(&self, id: Uuid) -> Result<Option<E>>;

    /// Insert a new record; fails if the id is already present.
    async fn insert(&self, entity: &E) -> Result<()>;

    /// Replace an existing record; fails if the id is absent.
    async fn update(&self, entity: &E) -> Result<()>;

    /// Physically remove a record.
    async fn remove(&self, id: Uuid) -> Result<()>;

    /// List records matching a query.
    async fn find(&self, query: ListQuery<E>) -> Result<Vec<E>>;

    /// Count records matching a predicate.
    async fn count(&self, filter: Option<Predicate<E>>) -> Result<usize>;
}

/// An open unit of work on a store.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Make every change since `begin` durable.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every change since `begin`.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Storage that supports explicit unit-of-work boundaries.
#[async_trait]
pub trait Transactional: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}

/// Notification sender collaborator.
///
/// Failures are expected to be logged and treated as non-fatal by
/// callers; nothing in the tenant subsystem blocks on delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, template: &str, context: &serde_json::Value) -> Result<()>;
}

/// Notifier that only logs. Used in tests and local development.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, template: &str, context: &serde_json::Value) -> Result<()> {
        tracing::info!(to = %to, template = %template, payload = %context, "Notification sent (log only)");
        Ok(())
    }
}

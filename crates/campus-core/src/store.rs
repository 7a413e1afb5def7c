//! In-memory record store for testing.

use crate::error::{CoreError, Result};
use crate::traits::{Entity, ListQuery, Predicate, Repository, SortOrder};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// In-memory `Repository` implementation backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryRepository<E: Entity> {
    records: Arc<RwLock<HashMap<Uuid, E>>>,
}

impl<E: Entity> InMemoryRepository<E> {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for InMemoryRepository<E> {
    async fn get(&self, id: Uuid) -> Result<Option<E>> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn insert(&self, entity: &E) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(&entity.id()) {
            return Err(CoreError::RecordExists(entity.id().to_string()));
        }
        records.insert(entity.id(), entity.clone());
        Ok(())
    }

    async fn update(&self, entity: &E) -> Result<()> {
        let mut records = self.records.write();
        if !records.contains_key(&entity.id()) {
            return Err(CoreError::RecordNotFound(entity.id().to_string()));
        }
        records.insert(entity.id(), entity.clone());
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        if self.records.write().remove(&id).is_none() {
            return Err(CoreError::RecordNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn find(&self, query: ListQuery<E>) -> Result<Vec<E>> {
        let records = self.records.read();

        let mut matched: Vec<E> = records
            .values()
            .filter(|e| query.filter.as_ref().map_or(true, |f| f(e)))
            .cloned()
            .collect();

        if let Some(cmp) = &query.order_by {
            matched.sort_by(|a, b| cmp(a, b));
            if query.direction == SortOrder::Descending {
                matched.reverse();
            }
        }

        let page: Vec<E> = matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(page)
    }

    async fn count(&self, filter: Option<Predicate<E>>) -> Result<usize> {
        let records = self.records.read();
        Ok(records
            .values()
            .filter(|e| filter.as_ref().map_or(true, |f| f(e)))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Widget {
        id: Uuid,
        name: String,
        weight: u32,
    }

    impl Entity for Widget {
        fn id(&self) -> Uuid {
            self.id
        }
    }

    fn widget(name: &str, weight: u32) -> Widget {
        Widget {
            id: Uuid::new_v4(),
            name: name.to_string(),
            weight,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = InMemoryRepository::new();
        let w = widget("bolt", 5);

        repo.insert(&w).await.unwrap();
        assert_eq!(repo.get(w.id).await.unwrap(), Some(w.clone()));

        // Duplicate insert rejected
        assert!(repo.insert(&w).await.is_err());
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let repo = InMemoryRepository::new();
        let w = widget("bolt", 5);

        assert!(repo.update(&w).await.is_err());
    }

    #[tokio::test]
    async fn test_find_with_filter_order_and_page() {
        let repo = InMemoryRepository::new();
        for (name, weight) in [("a", 3), ("b", 1), ("c", 2), ("d", 10)] {
            repo.insert(&widget(name, weight)).await.unwrap();
        }

        let query = ListQuery::default()
            .with_filter(|w: &Widget| w.weight < 10)
            .with_order(|a: &Widget, b: &Widget| a.weight.cmp(&b.weight), SortOrder::Ascending)
            .with_page(1, 2);

        let page = repo.find(query).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].weight, 2);
        assert_eq!(page[1].weight, 3);
    }

    #[tokio::test]
    async fn test_count() {
        let repo = InMemoryRepository::new();
        for (name, weight) in [("a", 3), ("b", 1)] {
            repo.insert(&widget(name, weight)).await.unwrap();
        }

        assert_eq!(repo.count(None).await.unwrap(), 2);
        assert_eq!(
            repo.count(Some(Arc::new(|w: &Widget| w.weight > 2))).await.unwrap(),
            1
        );
    }
}

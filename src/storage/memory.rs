//! In-process storage implementation.
//!
//! Documents live in insertion-ordered vectors behind a `RwLock`. Useful as a
//! test double and for one-shot runs where nothing needs to survive the process.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{apply_patch, assign_id, CatalogStore, Collection, Document, Filter, StorageError, StorageResult};
use crate::models::DocRef;

/// Memory-backed catalog store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<Collection, Vec<Document>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StorageError {
        StorageError::Unavailable("in-memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn insert(&self, collection: Collection, mut doc: Document) -> StorageResult<DocRef> {
        let id = assign_id(&mut doc);
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        collections.entry(collection).or_default().push(doc);
        Ok(id)
    }

    async fn find_one(&self, collection: Collection, filter: &Filter) -> StorageResult<Option<Document>> {
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.iter().find(|doc| filter.matches(doc)))
            .cloned())
    }

    async fn find(&self, collection: Collection, filter: &Filter) -> StorageResult<Vec<Document>> {
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        Ok(collections
            .get(&collection)
            .map(|docs| docs.iter().filter(|doc| filter.matches(doc)).cloned().collect())
            .unwrap_or_default())
    }

    async fn update_one(&self, collection: Collection, filter: &Filter, patch: Document) -> StorageResult<u64> {
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        let target = collections
            .get_mut(&collection)
            .and_then(|docs| docs.iter_mut().find(|doc| filter.matches(doc)));

        Ok(match target {
            Some(doc) => u64::from(apply_patch(doc, patch)),
            None => 0,
        })
    }

    async fn delete_one(&self, collection: Collection, filter: &Filter) -> StorageResult<u64> {
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        let Some(docs) = collections.get_mut(&collection) else {
            return Ok(0);
        };
        match docs.iter().position(|doc| filter.matches(doc)) {
            Some(index) => {
                docs.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> StorageResult<u64> {
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        Ok(collections
            .get(&collection)
            .map(|docs| docs.iter().filter(|doc| filter.matches(doc)).count() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_and_keeps_order() {
        let store = InMemoryStore::new();
        let a = store.insert(Collection::Events, doc(json!({"acronym": "SBES"}))).await.unwrap();
        let b = store.insert(Collection::Events, doc(json!({"acronym": "ICSE"}))).await.unwrap();
        assert_ne!(a, b);

        let all = store.find(Collection::Events, &Filter::All).await.unwrap();
        let acronyms: Vec<_> = all.iter().map(|d| d["acronym"].clone()).collect();
        assert_eq!(acronyms, vec![json!("SBES"), json!("ICSE")]);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = InMemoryStore::new();
        store.insert(Collection::Events, doc(json!({"name": "x"}))).await.unwrap();

        assert_eq!(store.count(Collection::Events, &Filter::All).await.unwrap(), 1);
        assert_eq!(store.count(Collection::Articles, &Filter::All).await.unwrap(), 0);
        assert!(store.find_one(Collection::Editions, &Filter::All).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_one_returns_first_match() {
        let store = InMemoryStore::new();
        let first = store.insert(Collection::Events, doc(json!({"acronym": "DUP"}))).await.unwrap();
        store.insert(Collection::Events, doc(json!({"acronym": "DUP"}))).await.unwrap();

        let found = store
            .find_one(Collection::Events, &Filter::eq("acronym", "DUP"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(super::super::document_id(&found), Some(first));
    }

    #[tokio::test]
    async fn test_update_and_delete_one() {
        let store = InMemoryStore::new();
        let id = store
            .insert(Collection::Articles, doc(json!({"title": "A", "pdf_ref": ""})))
            .await
            .unwrap();
        let by_id = Filter::eq("_id", &id);

        let patch = doc(json!({"pdf_ref": "uploads/a.pdf"}));
        assert_eq!(store.update_one(Collection::Articles, &by_id, patch.clone()).await.unwrap(), 1);
        assert_eq!(store.update_one(Collection::Articles, &by_id, patch).await.unwrap(), 0);
        assert_eq!(
            store.update_one(Collection::Articles, &Filter::eq("_id", "nope"), doc(json!({"x": 1}))).await.unwrap(),
            0
        );

        assert_eq!(store.delete_one(Collection::Articles, &by_id).await.unwrap(), 1);
        assert_eq!(store.delete_one(Collection::Articles, &by_id).await.unwrap(), 0);
        assert_eq!(store.count(Collection::Articles, &Filter::All).await.unwrap(), 0);
    }
}

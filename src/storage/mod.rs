//! Storage layer abstraction and implementations.
//!
//! This module defines the document-store interface the catalog core consumes:
//! three collections (`events`, `editions`, `articles`) of schemaless JSON
//! documents, addressed through [`Filter`]s. The store enforces no references
//! between collections; keeping them consistent is the ingestion pipeline's job.
//!
//! Two backends ship with the crate: [`memory::InMemoryStore`] and
//! [`sqlite::SqliteStore`]. Both evaluate filters with the same matcher so
//! their observable behavior is identical.

pub mod filter;
pub mod memory;
pub mod sqlite;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{field, DocRef};

pub use filter::Filter;

/// A stored document: a JSON object.
pub type Document = Map<String, Value>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store cannot be reached or is in an unusable state
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Query execution error
    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// Data serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Schema or migration error
    #[error("Schema error: {0}")]
    SchemaError(String),
}

impl StorageError {
    /// Whether the error means the store itself is gone, as opposed to one
    /// operation failing.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// The collections of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Events,
    Editions,
    Articles,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Events, Collection::Editions, Collection::Articles];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Events => "events",
            Collection::Editions => "editions",
            Collection::Articles => "articles",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for catalog storage backends.
///
/// Every call is a self-contained unit; the trait offers no transactions and
/// no atomic find-or-create. Methods take `&self` so one handle can be shared
/// by an ingestion run and concurrent searches.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert a document and return its identifier.
    ///
    /// If the document carries no `_id`, a fresh one is assigned.
    async fn insert(&self, collection: Collection, doc: Document) -> StorageResult<DocRef>;

    /// Return the first document matching `filter`, in natural order.
    async fn find_one(&self, collection: Collection, filter: &Filter) -> StorageResult<Option<Document>>;

    /// Return every document matching `filter`, in natural (insertion) order.
    async fn find(&self, collection: Collection, filter: &Filter) -> StorageResult<Vec<Document>>;

    /// Overwrite the top-level fields of `patch` on the first matching document.
    ///
    /// # Returns
    /// The number of documents actually modified (0 when nothing matched or
    /// the patch changed nothing)
    async fn update_one(&self, collection: Collection, filter: &Filter, patch: Document) -> StorageResult<u64>;

    /// Delete the first matching document, returning the number deleted.
    async fn delete_one(&self, collection: Collection, filter: &Filter) -> StorageResult<u64>;

    /// Count documents matching `filter`.
    async fn count(&self, collection: Collection, filter: &Filter) -> StorageResult<u64>;
}

#[async_trait]
impl<T: CatalogStore + ?Sized> CatalogStore for Arc<T> {
    async fn insert(&self, collection: Collection, doc: Document) -> StorageResult<DocRef> {
        (**self).insert(collection, doc).await
    }

    async fn find_one(&self, collection: Collection, filter: &Filter) -> StorageResult<Option<Document>> {
        (**self).find_one(collection, filter).await
    }

    async fn find(&self, collection: Collection, filter: &Filter) -> StorageResult<Vec<Document>> {
        (**self).find(collection, filter).await
    }

    async fn update_one(&self, collection: Collection, filter: &Filter, patch: Document) -> StorageResult<u64> {
        (**self).update_one(collection, filter, patch).await
    }

    async fn delete_one(&self, collection: Collection, filter: &Filter) -> StorageResult<u64> {
        (**self).delete_one(collection, filter).await
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> StorageResult<u64> {
        (**self).count(collection, filter).await
    }
}

/// Serialize a typed entity into a storable document.
pub fn to_document<T: Serialize>(entity: &T) -> StorageResult<Document> {
    match serde_json::to_value(entity)? {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::SerializationError(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// Deserialize a stored document into a typed entity.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> StorageResult<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Canonical identifier of a stored document, if it has one.
pub fn document_id(doc: &Document) -> Option<DocRef> {
    doc.get(field::ID).and_then(DocRef::from_value)
}

/// Ensure `doc` has an `_id`, generating one when missing.
pub(crate) fn assign_id(doc: &mut Document) -> DocRef {
    if let Some(id) = document_id(doc) {
        return id;
    }
    let id = DocRef::generate();
    doc.insert(field::ID.to_string(), Value::from(&id));
    id
}

/// Apply a top-level patch, returning whether anything changed.
pub(crate) fn apply_patch(doc: &mut Document, patch: Document) -> bool {
    let mut changed = false;
    for (key, value) in patch {
        if doc.get(&key) != Some(&value) {
            doc.insert(key, value);
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Event;
    use serde_json::json;

    #[test]
    fn test_document_round_trip_keeps_id() {
        let event = Event {
            id: Some(DocRef::new("ev1")),
            name: "International Conference on Software Engineering".to_string(),
            acronym: "ICSE".to_string(),
            description: String::new(),
        };
        let doc = to_document(&event).unwrap();
        assert_eq!(document_id(&doc), Some(DocRef::new("ev1")));

        let back: Event = from_document(doc).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_to_document_rejects_non_objects() {
        let result = to_document(&"just a string");
        assert!(matches!(result, Err(StorageError::SerializationError(_))));
    }

    #[test]
    fn test_assign_id_preserves_existing_native_id() {
        let mut doc = json!({"_id": {"$oid": "abc"}, "name": "x"})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(assign_id(&mut doc), DocRef::new("abc"));

        let mut fresh = Document::new();
        let id = assign_id(&mut fresh);
        assert_eq!(fresh.get("_id"), Some(&json!(id.as_str())));
    }

    #[test]
    fn test_apply_patch_reports_changes() {
        let mut doc = json!({"pdf_ref": "", "title": "T"}).as_object().cloned().unwrap();
        let patch = json!({"pdf_ref": "uploads/a.pdf"}).as_object().cloned().unwrap();

        assert!(apply_patch(&mut doc, patch.clone()));
        assert_eq!(doc["pdf_ref"], json!("uploads/a.pdf"));
        assert!(!apply_patch(&mut doc, patch));
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(StorageError::Unavailable("down".into()).is_unavailable());
        assert!(!StorageError::QueryError("bad".into()).is_unavailable());
    }
}

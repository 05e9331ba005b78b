//! SQLite storage implementation.
//!
//! This module provides a single-file implementation of the `CatalogStore`
//! trait. It uses rusqlite and keeps every document as a JSON body in one
//! table, tagged with its collection and canonical identifier.
//!
//! Filters are evaluated in process with the same matcher as the in-memory
//! backend; only plain `_id` lookups are pushed down to SQL.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode};
use tracing::{debug, info};

use super::{
    apply_patch, assign_id, CatalogStore, Collection, Document, Filter, StorageError, StorageResult,
};
use crate::models::DocRef;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS documents (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    doc_id     TEXT NOT NULL,
    body       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_collection_id ON documents (collection, doc_id);
";

/// SQLite-based catalog storage.
///
/// # Schema
/// - `documents`: (seq INTEGER PRIMARY KEY, collection TEXT, doc_id TEXT, body TEXT)
///
/// `seq` preserves insertion order, which is the natural iteration order
/// callers observe from `find`.
pub struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a catalog database file and make sure the schema exists.
    ///
    /// # Errors
    /// Returns `StorageError::Unavailable` if the file cannot be opened, or
    /// `StorageError::SchemaError` if schema creation fails
    pub fn open(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path).map_err(|e| {
            StorageError::Unavailable(format!("cannot open {}: {e}", db_path.display()))
        })?;
        let store = Self::bootstrap(conn)?;
        info!(path = %db_path.display(), "opened catalog database");
        Ok(store)
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Unavailable(format!("cannot open in-memory database: {e}")))?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> StorageResult<Self> {
        conn.busy_timeout(Duration::from_secs(5)).map_err(map_sql_error)?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| StorageError::SchemaError(e.to_string()))?;
        Ok(Self {
            connection: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| StorageError::Unavailable("sqlite connection lock poisoned".to_string()))
    }

    /// Load `(seq, document)` pairs matching `filter`, in insertion order.
    fn load_matching(
        conn: &Connection,
        collection: Collection,
        filter: &Filter,
    ) -> StorageResult<Vec<(i64, Document)>> {
        let rows = match filter.exact_id() {
            Some(id) => {
                let mut stmt = conn
                    .prepare_cached(
                        "SELECT seq, body FROM documents WHERE collection = ?1 AND doc_id = ?2 ORDER BY seq",
                    )
                    .map_err(map_sql_error)?;
                let rows = stmt
                    .query_map(params![collection.as_str(), id.as_str()], |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                    })
                    .map_err(map_sql_error)?;
                let collected = rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_error)?;
                collected
            }
            None => {
                let mut stmt = conn
                    .prepare_cached("SELECT seq, body FROM documents WHERE collection = ?1 ORDER BY seq")
                    .map_err(map_sql_error)?;
                let rows = stmt
                    .query_map(params![collection.as_str()], |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                    })
                    .map_err(map_sql_error)?;
                let collected = rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_error)?;
                collected
            }
        };

        let mut matching = Vec::new();
        for (seq, body) in rows {
            let doc = Self::decode_body(&body)?;
            if filter.matches(&doc) {
                matching.push((seq, doc));
            }
        }
        Ok(matching)
    }

    fn decode_body(body: &str) -> StorageResult<Document> {
        match serde_json::from_str(body)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(StorageError::SerializationError(format!(
                "stored body is not an object: {other}"
            ))),
        }
    }
}

fn map_sql_error(err: rusqlite::Error) -> StorageError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen) => {
            StorageError::Unavailable(err.to_string())
        }
        _ => StorageError::QueryError(err.to_string()),
    }
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn insert(&self, collection: Collection, mut doc: Document) -> StorageResult<DocRef> {
        let id = assign_id(&mut doc);
        let body = serde_json::to_string(&doc)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO documents (collection, doc_id, body) VALUES (?1, ?2, ?3)",
            params![collection.as_str(), id.as_str(), body],
        )
        .map_err(map_sql_error)?;
        debug!(%collection, %id, "inserted document");
        Ok(id)
    }

    async fn find_one(&self, collection: Collection, filter: &Filter) -> StorageResult<Option<Document>> {
        let conn = self.lock()?;
        Ok(Self::load_matching(&conn, collection, filter)?
            .into_iter()
            .next()
            .map(|(_, doc)| doc))
    }

    async fn find(&self, collection: Collection, filter: &Filter) -> StorageResult<Vec<Document>> {
        let conn = self.lock()?;
        Ok(Self::load_matching(&conn, collection, filter)?
            .into_iter()
            .map(|(_, doc)| doc)
            .collect())
    }

    async fn update_one(&self, collection: Collection, filter: &Filter, patch: Document) -> StorageResult<u64> {
        let conn = self.lock()?;
        let Some((seq, mut doc)) = Self::load_matching(&conn, collection, filter)?.into_iter().next() else {
            return Ok(0);
        };
        if !apply_patch(&mut doc, patch) {
            return Ok(0);
        }

        // A patch may rewrite `_id`; keep the indexed column in step.
        let id = assign_id(&mut doc);
        let body = serde_json::to_string(&doc)?;
        conn.execute(
            "UPDATE documents SET doc_id = ?1, body = ?2 WHERE seq = ?3",
            params![id.as_str(), body, seq],
        )
        .map_err(map_sql_error)?;
        Ok(1)
    }

    async fn delete_one(&self, collection: Collection, filter: &Filter) -> StorageResult<u64> {
        let conn = self.lock()?;
        let Some((seq, _)) = Self::load_matching(&conn, collection, filter)?.into_iter().next() else {
            return Ok(0);
        };
        let deleted = conn
            .execute("DELETE FROM documents WHERE seq = ?1", params![seq])
            .map_err(map_sql_error)?;
        Ok(deleted as u64)
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> StorageResult<u64> {
        let conn = self.lock()?;
        if matches!(filter, Filter::All) {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                    params![collection.as_str()],
                    |row| row.get(0),
                )
                .map_err(map_sql_error)?;
            return Ok(count as u64);
        }
        Ok(Self::load_matching(&conn, collection, filter)?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.db");

        let id = {
            let store = SqliteStore::open(&path).unwrap();
            store
                .insert(Collection::Events, doc(json!({"acronym": "SBES", "name": "Simpósio"})))
                .await
                .unwrap()
        };

        let store = SqliteStore::open(&path).unwrap();
        let found = store
            .find_one(Collection::Events, &Filter::eq("_id", &id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found["acronym"], json!("SBES"));
        assert_eq!(store.count(Collection::Events, &Filter::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_preserves_insertion_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        for title in ["Machine Learning em Python", "Compiladores", "Deep Learning com TensorFlow"] {
            store
                .insert(Collection::Articles, doc(json!({"title": title})))
                .await
                .unwrap();
        }

        let found = store
            .find(Collection::Articles, &Filter::contains("title", "learning"))
            .await
            .unwrap();
        let titles: Vec<_> = found.iter().map(|d| d["title"].as_str().unwrap().to_string()).collect();
        assert_eq!(titles, vec!["Machine Learning em Python", "Deep Learning com TensorFlow"]);
    }

    #[tokio::test]
    async fn test_native_id_lookup_uses_canonical_form() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert(Collection::Editions, doc(json!({"_id": {"$oid": "ed1"}, "year": 2024})))
            .await
            .unwrap();

        let found = store
            .find_one(Collection::Editions, &Filter::eq("_id", "ed1"))
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_update_delete_and_count() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .insert(Collection::Articles, doc(json!({"title": "A", "pdf_ref": ""})))
            .await
            .unwrap();
        store
            .insert(Collection::Articles, doc(json!({"title": "B", "pdf_ref": ""})))
            .await
            .unwrap();
        let by_id = Filter::eq("_id", &id);

        let patch = doc(json!({"pdf_ref": "uploads/a.pdf"}));
        assert_eq!(store.update_one(Collection::Articles, &by_id, patch.clone()).await.unwrap(), 1);
        assert_eq!(store.update_one(Collection::Articles, &by_id, patch).await.unwrap(), 0);
        assert_eq!(
            store
                .count(Collection::Articles, &Filter::eq("pdf_ref", "uploads/a.pdf"))
                .await
                .unwrap(),
            1
        );

        assert_eq!(store.delete_one(Collection::Articles, &by_id).await.unwrap(), 1);
        assert_eq!(store.delete_one(Collection::Articles, &by_id).await.unwrap(), 0);
        assert_eq!(store.count(Collection::Articles, &Filter::All).await.unwrap(), 1);
    }
}

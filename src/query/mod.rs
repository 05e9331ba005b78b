//! Federated search module.
//!
//! This module answers free-text queries across the three catalog
//! collections. The store has no joins, so lookups that cross collections
//! (articles of an event, the event of an article) are done here, by
//! identifier sets.
//!
//! # Usage
//!
//! ```rust,no_run
//! use event_catalog::query::{FederatedSearchEngine, SearchEngine, SearchMode, SearchQuery};
//! use event_catalog::storage::memory::InMemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = FederatedSearchEngine::new(InMemoryStore::new());
//!
//! let query = SearchQuery::new("Learning", SearchMode::Title);
//! let results = engine.search(&query).await?;
//!
//! // Results come back in store order, not ranked
//! for result in results {
//!     println!("{} ({:?})", result.article.title, result.event_acronym);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Matching is case-insensitive substring containment everywhere.

pub mod browse;

use std::collections::{HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{field, Article, DocRef, Edition, Event};
use crate::storage::{document_id, from_document, CatalogStore, Collection, Document, Filter, StorageError};

/// Errors that can occur during query processing.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Invalid query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Storage access failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Which part of the catalog a query is matched against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Article titles
    Title,

    /// Author names
    Author,

    /// Event names and acronyms
    Event,

    /// Union of the other three
    #[default]
    All,
}

impl SearchMode {
    /// Parse a mode literal.
    ///
    /// Accepts the English names and the catalog's Portuguese ones
    /// (`titulo`, `autor`, `evento`, `tudo`), ignoring case. Anything else
    /// means [`SearchMode::All`].
    pub fn parse(literal: &str) -> Self {
        match literal.trim().to_lowercase().as_str() {
            "title" | "titulo" | "título" => SearchMode::Title,
            "author" | "autor" => SearchMode::Author,
            "event" | "evento" => SearchMode::Event,
            _ => SearchMode::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Title => "title",
            SearchMode::Author => "author",
            SearchMode::Event => "event",
            SearchMode::All => "all",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// The text to look for
    pub query: String,

    pub mode: SearchMode,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            query: query.into(),
            mode,
        }
    }
}

/// A search request as it arrives from a caller.
///
/// Both fields are optional on the wire: a missing `q` is rejected when the
/// request is handled, a missing `tipo` means `all`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub q: Option<String>,

    #[serde(default)]
    pub tipo: Option<String>,
}

/// An article with the names of the edition and event it belongs to.
///
/// The extra fields are omitted when the reference they come from is
/// dangling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedArticle {
    #[serde(flatten)]
    pub article: Article,

    #[serde(rename = "edicao_ano", default, skip_serializing_if = "Option::is_none")]
    pub edition_year: Option<i32>,

    #[serde(rename = "evento_nome", default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,

    #[serde(rename = "evento_sigla", default, skip_serializing_if = "Option::is_none")]
    pub event_acronym: Option<String>,
}

/// Search results plus the request they answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "resultados")]
    pub results: Vec<EnrichedArticle>,

    pub total: usize,

    pub query: String,

    /// The mode literal as requested
    #[serde(rename = "tipo")]
    pub mode: String,
}

/// Trait for search engines over the catalog.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Execute a search query.
    ///
    /// # Returns
    /// Matching articles, enriched, in store order. Never an error for a
    /// non-empty query against a reachable store.
    ///
    /// # Errors
    /// Returns `QueryError::InvalidQuery` for an empty or blank query, before
    /// any store access, and `QueryError::Storage` if the store fails
    async fn search(&self, query: &SearchQuery) -> QueryResult<Vec<EnrichedArticle>>;
}

/// Search engine that federates queries over events, editions and articles.
pub struct FederatedSearchEngine<S>
where
    S: CatalogStore,
{
    store: S,
}

impl<S> FederatedSearchEngine<S>
where
    S: CatalogStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handle a wire-level request and build the response.
    ///
    /// # Errors
    /// Returns `QueryError::InvalidQuery` if `q` is missing or blank
    pub async fn handle(&self, request: &SearchRequest) -> QueryResult<SearchResponse> {
        let text = request.q.as_deref().map(str::trim).unwrap_or_default();
        let mode_literal = request.tipo.clone().unwrap_or_else(|| SearchMode::All.to_string());
        let query = SearchQuery::new(text, SearchMode::parse(&mode_literal));

        let results = self.search(&query).await?;
        Ok(SearchResponse {
            total: results.len(),
            results,
            query: query.query,
            mode: mode_literal,
        })
    }

    async fn articles_by_title(&self, text: &str) -> QueryResult<Vec<Document>> {
        Ok(self
            .store
            .find(Collection::Articles, &Filter::contains(field::TITLE, text))
            .await?)
    }

    async fn articles_by_author(&self, text: &str) -> QueryResult<Vec<Document>> {
        Ok(self
            .store
            .find(Collection::Articles, &Filter::contains(field::AUTHOR_NAME, text))
            .await?)
    }

    /// Events matching `text` -> their editions -> their articles.
    async fn articles_by_event(&self, text: &str) -> QueryResult<Vec<Document>> {
        let event_filter = Filter::or(vec![
            Filter::contains(field::NAME, text),
            Filter::contains(field::ACRONYM, text),
        ]);
        let event_ids = ids_of(&self.store.find(Collection::Events, &event_filter).await?);
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }

        let edition_ids = ids_of(
            &self
                .store
                .find(Collection::Editions, &Filter::is_in(field::EVENT_ID, event_ids))
                .await?,
        );
        if edition_ids.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .store
            .find(Collection::Articles, &Filter::is_in(field::EDITION_ID, edition_ids))
            .await?)
    }

    /// Attach edition year and event identity to each article.
    ///
    /// Editions and events are fetched once per distinct reference. Dangling
    /// references leave the corresponding fields empty.
    async fn enrich(&self, articles: Vec<Article>) -> QueryResult<Vec<EnrichedArticle>> {
        let edition_ids: HashSet<DocRef> = articles.iter().map(|a| a.edition_id.clone()).collect();
        let editions: HashMap<DocRef, Edition> = if edition_ids.is_empty() {
            HashMap::new()
        } else {
            self.store
                .find(Collection::Editions, &Filter::is_in(field::ID, edition_ids))
                .await?
                .into_iter()
                .filter_map(keyed::<Edition>)
                .collect()
        };

        let event_ids: HashSet<DocRef> = editions.values().map(|e| e.event_id.clone()).collect();
        let events: HashMap<DocRef, Event> = if event_ids.is_empty() {
            HashMap::new()
        } else {
            self.store
                .find(Collection::Events, &Filter::is_in(field::ID, event_ids))
                .await?
                .into_iter()
                .filter_map(keyed::<Event>)
                .collect()
        };

        Ok(articles
            .into_iter()
            .map(|article| {
                let edition = editions.get(&article.edition_id);
                if edition.is_none() {
                    warn!(
                        edition = %article.edition_id,
                        title = %article.title,
                        "article references a missing edition"
                    );
                }
                let event = edition.and_then(|edition| {
                    let event = events.get(&edition.event_id);
                    if event.is_none() {
                        warn!(event = %edition.event_id, "edition references a missing event");
                    }
                    event
                });

                EnrichedArticle {
                    edition_year: edition.map(|e| e.year),
                    event_name: event.map(|e| e.name.clone()),
                    event_acronym: event.map(|e| e.acronym.clone()),
                    article,
                }
            })
            .collect())
    }
}

#[async_trait]
impl<S> SearchEngine for FederatedSearchEngine<S>
where
    S: CatalogStore,
{
    async fn search(&self, query: &SearchQuery) -> QueryResult<Vec<EnrichedArticle>> {
        let text = query.query.trim();
        if text.is_empty() {
            return Err(QueryError::InvalidQuery("query must not be empty".to_string()));
        }

        let documents = match query.mode {
            SearchMode::Title => self.articles_by_title(text).await?,
            SearchMode::Author => self.articles_by_author(text).await?,
            SearchMode::Event => self.articles_by_event(text).await?,
            SearchMode::All => {
                let mut merged = self.articles_by_title(text).await?;
                merged.extend(self.articles_by_author(text).await?);
                merged.extend(self.articles_by_event(text).await?);
                dedup_by_id(merged)
            }
        };

        let articles: Vec<Article> = documents
            .into_iter()
            .filter_map(|doc| match from_document::<Article>(doc) {
                Ok(article) => Some(article),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable article document");
                    None
                }
            })
            .collect();

        debug!(query = text, mode = %query.mode, hits = articles.len(), "search finished");
        self.enrich(articles).await
    }
}

fn ids_of(documents: &[Document]) -> Vec<DocRef> {
    documents.iter().filter_map(document_id).collect()
}

/// Keep the first occurrence of each article, preserving order.
fn dedup_by_id(documents: Vec<Document>) -> Vec<Document> {
    let mut seen = HashSet::new();
    documents
        .into_iter()
        .filter(|doc| match document_id(doc) {
            Some(id) => seen.insert(id),
            None => true,
        })
        .collect()
}

/// Pair a stored document with its canonical id, dropping unreadable ones.
fn keyed<T: serde::de::DeserializeOwned>(doc: Document) -> Option<(DocRef, T)> {
    let id = document_id(&doc)?;
    from_document(doc).ok().map(|entity| (id, entity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;
    use crate::storage::StorageResult;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Store that counts every call it receives.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryStore,
        calls: AtomicUsize,
    }

    impl CountingStore {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn tick(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CatalogStore for CountingStore {
        async fn insert(&self, collection: Collection, doc: Document) -> StorageResult<DocRef> {
            self.tick();
            self.inner.insert(collection, doc).await
        }

        async fn find_one(&self, collection: Collection, filter: &Filter) -> StorageResult<Option<Document>> {
            self.tick();
            self.inner.find_one(collection, filter).await
        }

        async fn find(&self, collection: Collection, filter: &Filter) -> StorageResult<Vec<Document>> {
            self.tick();
            self.inner.find(collection, filter).await
        }

        async fn update_one(&self, collection: Collection, filter: &Filter, patch: Document) -> StorageResult<u64> {
            self.tick();
            self.inner.update_one(collection, filter, patch).await
        }

        async fn delete_one(&self, collection: Collection, filter: &Filter) -> StorageResult<u64> {
            self.tick();
            self.inner.delete_one(collection, filter).await
        }

        async fn count(&self, collection: Collection, filter: &Filter) -> StorageResult<u64> {
            self.tick();
            self.inner.count(collection, filter).await
        }
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    /// Two events, three editions, five articles. `ed-orphan` points at a
    /// missing event and `art-dangling` at a missing edition.
    async fn seed(store: &impl CatalogStore) {
        for event in [
            json!({"_id": "ev-sbes", "name": "Simpósio Brasileiro de Engenharia de Software", "acronym": "SBES"}),
            json!({"_id": "ev-icse", "name": "International Conference on Software Engineering", "acronym": "ICSE"}),
        ] {
            store.insert(Collection::Events, doc(event)).await.unwrap();
        }
        for edition in [
            json!({"_id": "ed-sbes-2024", "event_id": "ev-sbes", "year": 2024}),
            json!({"_id": {"$oid": "ed-icse-2023"}, "event_id": {"$oid": "ev-icse"}, "year": 2023}),
            json!({"_id": "ed-orphan", "event_id": "ev-gone", "year": 2019}),
        ] {
            store.insert(Collection::Editions, doc(edition)).await.unwrap();
        }
        for article in [
            json!({"_id": "art-ml", "title": "Machine Learning em Python",
                   "authors": [{"name": "João Silva", "email": "silva@email.com"}],
                   "edition_id": "ed-sbes-2024"}),
            json!({"_id": "art-dl", "title": "Deep Learning com TensorFlow",
                   "authors": [{"name": "Maria Santos", "email": "santos@email.com"}],
                   "edition_id": "ed-sbes-2024"}),
            json!({"_id": "art-mut", "title": "Mutation Testing at Scale",
                   "authors": [{"name": "Ana Learning", "email": "learning@email.com"}],
                   "edition_id": {"$oid": "ed-icse-2023"}}),
            json!({"_id": "art-orphan", "title": "Legacy Study",
                   "authors": [{"name": "Carlos Lima", "email": "lima@email.com"}],
                   "edition_id": "ed-orphan"}),
            json!({"_id": "art-dangling", "title": "Lost Paper",
                   "authors": [{"name": "Bruno Anderson", "email": "anderson@email.com"}],
                   "edition_id": "ed-missing"}),
        ] {
            store.insert(Collection::Articles, doc(article)).await.unwrap();
        }
    }

    async fn engine() -> FederatedSearchEngine<InMemoryStore> {
        let store = InMemoryStore::new();
        seed(&store).await;
        FederatedSearchEngine::new(store)
    }

    fn ids(results: &[EnrichedArticle]) -> Vec<&str> {
        results
            .iter()
            .map(|r| r.article.id.as_ref().map(DocRef::as_str).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(SearchMode::parse("titulo"), SearchMode::Title);
        assert_eq!(SearchMode::parse("TITLE"), SearchMode::Title);
        assert_eq!(SearchMode::parse("autor"), SearchMode::Author);
        assert_eq!(SearchMode::parse("evento"), SearchMode::Event);
        assert_eq!(SearchMode::parse("tudo"), SearchMode::All);
        assert_eq!(SearchMode::parse("whatever"), SearchMode::All);
        assert_eq!(SearchMode::parse(""), SearchMode::All);
    }

    #[tokio::test]
    async fn test_title_search_matches_case_insensitively() {
        let engine = engine().await;

        let results = engine.search(&SearchQuery::new("learning", SearchMode::Title)).await.unwrap();
        assert_eq!(ids(&results), vec!["art-ml", "art-dl"]);

        let first = &results[0];
        assert_eq!(first.edition_year, Some(2024));
        assert_eq!(first.event_acronym.as_deref(), Some("SBES"));
        assert_eq!(first.event_name.as_deref(), Some("Simpósio Brasileiro de Engenharia de Software"));
    }

    #[tokio::test]
    async fn test_author_search_matches_substrings() {
        let engine = engine().await;

        let results = engine.search(&SearchQuery::new("an", SearchMode::Author)).await.unwrap();
        // "Santos", "Ana", "Anderson"
        assert_eq!(ids(&results), vec!["art-dl", "art-mut", "art-dangling"]);
    }

    #[tokio::test]
    async fn test_event_search_follows_editions() {
        let engine = engine().await;

        let results = engine.search(&SearchQuery::new("icse", SearchMode::Event)).await.unwrap();
        assert_eq!(ids(&results), vec!["art-mut"]);
        assert_eq!(results[0].edition_year, Some(2023));
        assert_eq!(results[0].event_acronym.as_deref(), Some("ICSE"));

        let results = engine
            .search(&SearchQuery::new("Engenharia de Software", SearchMode::Event))
            .await
            .unwrap();
        assert_eq!(ids(&results), vec!["art-ml", "art-dl"]);
    }

    #[tokio::test]
    async fn test_event_search_without_matching_events_skips_further_queries() {
        let store = CountingStore::default();
        seed(&store).await;
        let engine = FederatedSearchEngine::new(store);
        let before = engine.store().calls();

        let results = engine.search(&SearchQuery::new("nonexistent", SearchMode::Event)).await.unwrap();

        assert!(results.is_empty());
        assert_eq!(engine.store().calls() - before, 1);
    }

    #[tokio::test]
    async fn test_all_mode_unions_without_duplicates() {
        let engine = engine().await;

        // Title matches art-ml and art-dl, author matches art-mut, and the
        // event match on "Learning" finds nothing.
        let results = engine.search(&SearchQuery::new("Learning", SearchMode::All)).await.unwrap();
        assert_eq!(ids(&results), vec!["art-ml", "art-dl", "art-mut"]);

        // Only event names mention software, in both events
        let results = engine.search(&SearchQuery::new("software", SearchMode::All)).await.unwrap();
        assert_eq!(ids(&results), vec!["art-ml", "art-dl", "art-mut"]);
    }

    #[tokio::test]
    async fn test_all_mode_counts_multi_branch_hits_once() {
        let store = InMemoryStore::new();
        seed(&store).await;
        store
            .insert(
                Collection::Articles,
                doc(json!({"_id": "art-both", "title": "SBES retrospective",
                           "authors": [{"name": "Sbes Team", "email": "team@email.com"}],
                           "edition_id": "ed-sbes-2024"})),
            )
            .await
            .unwrap();
        let engine = FederatedSearchEngine::new(store);

        let results = engine.search(&SearchQuery::new("sbes", SearchMode::All)).await.unwrap();
        assert_eq!(ids(&results), vec!["art-both", "art-ml", "art-dl"]);
    }

    #[tokio::test]
    async fn test_dangling_references_are_omitted_not_errors() {
        let engine = engine().await;

        let results = engine.search(&SearchQuery::new("Lost", SearchMode::Title)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].edition_year, None);
        assert_eq!(results[0].event_name, None);

        let results = engine.search(&SearchQuery::new("Legacy", SearchMode::Title)).await.unwrap();
        assert_eq!(results[0].edition_year, Some(2019));
        assert_eq!(results[0].event_acronym, None);

        let json = serde_json::to_value(&results[0]).unwrap();
        assert_eq!(json["edicao_ano"], json!(2019));
        assert!(json.get("evento_sigla").is_none());
        assert_eq!(json["title"], json!("Legacy Study"));
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected_without_store_access() {
        let engine = FederatedSearchEngine::new(CountingStore::default());

        for text in ["", "   "] {
            let result = engine.search(&SearchQuery::new(text, SearchMode::All)).await;
            assert!(matches!(result, Err(QueryError::InvalidQuery(_))));
        }
        let result = engine.handle(&SearchRequest::default()).await;
        assert!(matches!(result, Err(QueryError::InvalidQuery(_))));

        assert_eq!(engine.store().calls(), 0);
    }

    #[tokio::test]
    async fn test_handle_builds_response() {
        let engine = engine().await;
        let request: SearchRequest = serde_json::from_value(json!({"q": "Learning", "tipo": "titulo"})).unwrap();

        let response = engine.handle(&request).await.unwrap();
        assert_eq!(response.total, 2);
        assert_eq!(response.query, "Learning");
        assert_eq!(response.mode, "titulo");

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["total"], json!(2));
        assert_eq!(json["tipo"], json!("titulo"));
        assert_eq!(json["resultados"][0]["evento_sigla"], json!("SBES"));
    }

    #[tokio::test]
    async fn test_handle_defaults_and_unknown_modes() {
        let engine = engine().await;

        let response = engine
            .handle(&SearchRequest {
                q: Some("Learning".to_string()),
                tipo: None,
            })
            .await
            .unwrap();
        assert_eq!(response.mode, "all");
        assert_eq!(response.total, 3);

        let response = engine
            .handle(&SearchRequest {
                q: Some("Learning".to_string()),
                tipo: Some("relevance".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(response.mode, "relevance");
        assert_eq!(response.total, 3);
    }

    #[tokio::test]
    async fn test_engine_works_through_shared_handle() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store).await;
        let engine = FederatedSearchEngine::new(Arc::clone(&store));

        let results = engine.search(&SearchQuery::new("mutation", SearchMode::Title)).await.unwrap();
        assert_eq!(ids(&results), vec!["art-mut"]);
    }
}

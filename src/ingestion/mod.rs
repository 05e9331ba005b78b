//! Ingestion pipeline module.
//!
//! This module turns batches of bibliography entries into catalog entities:
//! it classifies each entry's venue, finds or creates the matching Event and
//! Edition, deduplicates Articles by title, and writes everything to a
//! [`CatalogStore`].
//!
//! # Usage
//!
//! ```ignore
//! use event_catalog::ingestion::IngestionPipeline;
//! use event_catalog::provider::bibtex::BibtexProvider;
//! use event_catalog::storage::sqlite::SqliteStore;
//!
//! let store = SqliteStore::open("catalog.db")?;
//! let pipeline = IngestionPipeline::new(store);
//!
//! let provider = BibtexProvider::from_file("sbes2024.bib").await?;
//! let report = pipeline.ingest_from_provider(&provider).await?;
//! println!("Created: {}, Duplicates: {}", report.articles_created, report.duplicate_articles);
//! ```
//!
//! # Failure isolation
//!
//! A run never aborts because of one bad entry. Malformed BibTeX entries,
//! missing titles and store errors raised while handling an entry are
//! recorded in the
//! [`IngestionReport`] and the run moves on. The exception is
//! [`StorageError::Unavailable`]: when the store itself is gone the run stops
//! and the error is returned.
//!
//! Writes are additive. If an entry fails after its Event or Edition was
//! created, those stay in the store.

pub mod fields;
pub mod venue;

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::{field, Article, DocRef, Edition, Event};
use crate::provider::bibtex::{BibtexProvider, SkippedEntry};
use crate::provider::{BibEntry, BibliographyProvider, ProviderError};
use crate::storage::{document_id, to_document, CatalogStore, Collection, Document, Filter, StorageError};
use crate::text::normalize_text;

pub use venue::Venue;

/// Entry id recorded for entries without a citation key.
const UNKNOWN_ENTRY_ID: &str = "unknown";

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Provider operation failed
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The payload is not a bibliography this pipeline can read
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// No article with the given identifier
    #[error("Article not found: {0}")]
    ArticleNotFound(DocRef),
}

impl IngestionError {
    /// Whether this error must abort a whole run rather than a single entry.
    fn is_fatal(&self) -> bool {
        matches!(self, IngestionError::Storage(e) if e.is_unavailable())
    }
}

/// Result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// How incoming titles are compared with stored ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleMatch {
    /// Byte-for-byte title equality
    #[default]
    Exact,

    /// Equality after trimming, case folding and whitespace collapsing.
    /// Articles get a `title_key` field holding the normalized form.
    Normalized,
}

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionConfig {
    pub title_match: TitleMatch,

    /// Domain for synthesized author emails
    pub email_domain: String,

    /// Acronym used when none can be derived from the booktitle
    pub fallback_acronym: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            title_match: TitleMatch::Exact,
            email_domain: "email.com".to_string(),
            fallback_acronym: "CONF".to_string(),
        }
    }
}

/// A failed entry, as recorded in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryError {
    pub entry_id: String,
    pub message: String,
}

/// Report of one ingestion run.
///
/// Serializes to the JSON shape returned to upload callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionReport {
    /// Number of entries in the input batch
    pub total_entries: usize,

    pub events_created: usize,

    pub editions_created: usize,

    pub articles_created: usize,

    /// Entries skipped because an article with the same title exists
    pub duplicate_articles: usize,

    pub errors: Vec<EntryError>,
}

impl IngestionReport {
    /// Create a report for a batch of `total_entries` entries.
    pub fn new(total_entries: usize) -> Self {
        Self {
            total_entries,
            ..Self::default()
        }
    }

    /// Record the outcome of one entry.
    pub fn record(&mut self, entry_id: &str, outcome: &EntryOutcome) {
        match outcome {
            EntryOutcome::Created { .. } => self.articles_created += 1,
            EntryOutcome::Duplicate => self.duplicate_articles += 1,
            EntryOutcome::Failed(message) => self.errors.push(EntryError {
                entry_id: entry_id.to_string(),
                message: message.clone(),
            }),
        }
    }

    /// Record the events and editions an entry created, whatever its outcome.
    pub fn record_writes(&mut self, writes: EntryWrites) {
        self.events_created += usize::from(writes.event_created);
        self.editions_created += usize::from(writes.edition_created);
    }

    /// Record entries the parser had to skip as failures.
    ///
    /// They count towards `total_entries`. Entries without a readable
    /// citation key are identified by line.
    pub fn record_unparsed(&mut self, skipped: &[SkippedEntry]) {
        for entry in skipped {
            self.total_entries += 1;
            self.errors.push(EntryError {
                entry_id: entry.key.clone().unwrap_or_else(|| format!("line {}", entry.line)),
                message: format!("malformed entry at line {}: {}", entry.line, entry.message),
            });
        }
    }

    /// Number of entries that did not produce an article or a duplicate.
    pub fn failed(&self) -> usize {
        self.errors.len()
    }
}

/// What happened to one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// A new article was written
    Created { article_id: DocRef },

    /// An article with the same title already exists
    Duplicate,

    /// The entry was skipped; the message goes into the report
    Failed(String),
}

/// Events and editions created while handling one entry.
///
/// Kept apart from [`EntryOutcome`] because they stay in the store even when
/// the entry itself fails afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryWrites {
    pub event_created: bool,
    pub edition_created: bool,
}

/// Dedup key used under [`TitleMatch::Normalized`].
pub fn title_key(title: &str) -> String {
    normalize_text(title)
}

/// Ingestion pipeline coordinator.
///
/// Runs are serialized through a writer lock so that the find-or-create
/// steps for Events and Editions of one run cannot interleave with those of
/// another. Clones of a pipeline share the lock; two pipelines built
/// separately over the same store do not.
pub struct IngestionPipeline<S>
where
    S: CatalogStore,
{
    /// Storage backend for persisting entities
    store: S,

    config: IngestionConfig,

    writer: Arc<Mutex<()>>,
}

impl<S> Clone for IngestionPipeline<S>
where
    S: CatalogStore + Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<S> IngestionPipeline<S>
where
    S: CatalogStore,
{
    /// Create a pipeline with the default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, IngestionConfig::default())
    }

    pub fn with_config(store: S, config: IngestionConfig) -> Self {
        Self {
            store,
            config,
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// Ingest a raw BibTeX payload.
    ///
    /// This is the entry point for uploads. The payload is parsed in full
    /// before anything is written. Malformed entries do not stop the run:
    /// they are left out and listed in the report's `errors`.
    ///
    /// # Errors
    /// Returns `IngestionError::UnsupportedFormat` if the payload is not
    /// UTF-8 text, and `IngestionError::Storage` if the store becomes
    /// unavailable mid-run
    pub async fn ingest_bibtex(&self, payload: &[u8]) -> IngestionResult<IngestionReport> {
        let provider = BibtexProvider::from_bytes(payload, "upload").map_err(|e| match e {
            ProviderError::UnsupportedFormat(message) => IngestionError::UnsupportedFormat(message),
            other => IngestionError::Provider(other),
        })?;
        let document = provider.document();
        for skipped in &document.skipped {
            warn!(key = ?skipped.key, line = skipped.line, message = %skipped.message, "skipping malformed entry");
        }

        let mut report = self.ingest_entries(&document.entries).await?;
        report.record_unparsed(&document.skipped);
        Ok(report)
    }

    /// Ingest every entry a provider supplies.
    ///
    /// # Errors
    /// Returns `IngestionError::Provider` if the entries cannot be fetched,
    /// or `IngestionError::Storage` if the store becomes unavailable
    pub async fn ingest_from_provider<P>(&self, provider: &P) -> IngestionResult<IngestionReport>
    where
        P: BibliographyProvider + ?Sized,
    {
        let entries = provider.fetch_entries().await?;
        debug!(provider = provider.name(), entries = entries.len(), "fetched bibliography entries");
        self.ingest_entries(&entries).await
    }

    /// Ingest a batch of parsed entries.
    ///
    /// # Returns
    /// The run report. Partial success is still success: entries that failed
    /// are listed in `errors`.
    ///
    /// # Errors
    /// Returns `IngestionError::Storage` only if the store is unavailable
    pub async fn ingest_entries(&self, entries: &[BibEntry]) -> IngestionResult<IngestionReport> {
        self.ingest_entries_with_progress(entries, |_, _| {}).await
    }

    /// Ingest a batch, calling `on_entry` after each entry is handled.
    ///
    /// # Arguments
    /// * `entries` - Entries to ingest, in order
    /// * `on_entry` - Callback receiving each entry and its outcome
    pub async fn ingest_entries_with_progress<F>(
        &self,
        entries: &[BibEntry],
        mut on_entry: F,
    ) -> IngestionResult<IngestionReport>
    where
        F: FnMut(&BibEntry, &EntryOutcome),
    {
        let mut report = IngestionReport::new(entries.len());
        if entries.is_empty() {
            return Ok(report);
        }

        let _writer = self.writer.lock().await;

        for entry in entries {
            let entry_id = if entry.id.trim().is_empty() {
                UNKNOWN_ENTRY_ID
            } else {
                entry.id.as_str()
            };

            let mut writes = EntryWrites::default();
            let outcome = match self.ingest_entry(entry, &mut writes).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_fatal() => {
                    warn!(entry = entry_id, error = %e, "store unavailable, aborting ingestion run");
                    return Err(e);
                }
                Err(e) => EntryOutcome::Failed(e.to_string()),
            };

            match &outcome {
                EntryOutcome::Failed(message) => warn!(entry = entry_id, %message, "entry failed"),
                EntryOutcome::Duplicate => debug!(entry = entry_id, "duplicate article skipped"),
                EntryOutcome::Created { article_id, .. } => {
                    debug!(entry = entry_id, article = %article_id, "article created")
                }
            }

            report.record(entry_id, &outcome);
            report.record_writes(writes);
            on_entry(entry, &outcome);
        }

        info!(
            total = report.total_entries,
            events = report.events_created,
            editions = report.editions_created,
            articles = report.articles_created,
            duplicates = report.duplicate_articles,
            failed = report.failed(),
            "ingestion run finished"
        );
        Ok(report)
    }

    /// Record the stored PDF location for an article.
    ///
    /// Called by the upload flow once the file is saved; the pipeline never
    /// touches the file itself.
    ///
    /// # Errors
    /// Returns `IngestionError::ArticleNotFound` if no article has `article_id`
    pub async fn attach_pdf(&self, article_id: &DocRef, pdf_ref: &str) -> IngestionResult<()> {
        let by_id = Filter::eq(field::ID, article_id);
        let mut patch = Document::new();
        patch.insert(field::PDF_REF.to_string(), pdf_ref.into());

        let modified = self.store.update_one(Collection::Articles, &by_id, patch).await?;
        if modified == 0 && self.store.count(Collection::Articles, &by_id).await? == 0 {
            return Err(IngestionError::ArticleNotFound(article_id.clone()));
        }
        debug!(article = %article_id, pdf_ref, "attached pdf reference");
        Ok(())
    }

    async fn ingest_entry(&self, entry: &BibEntry, writes: &mut EntryWrites) -> IngestionResult<EntryOutcome> {
        let title = entry.get("title").unwrap_or_default();
        if title.trim().is_empty() {
            return Ok(EntryOutcome::Failed("missing title".to_string()));
        }

        if self.article_exists(title).await? {
            return Ok(EntryOutcome::Duplicate);
        }

        let venue = Venue::classify(entry.get("booktitle"), &self.config.fallback_acronym);
        let (event_id, event_created) = self.find_or_create_event(&venue).await?;
        writes.event_created = event_created;

        let year = fields::parse_year(entry.get("year"));
        let location = entry.get("address").map(str::trim).unwrap_or_default();
        let (edition_id, edition_created) = self.find_or_create_edition(&event_id, year, location).await?;
        writes.edition_created = edition_created;

        let article = Article {
            id: None,
            title: title.to_string(),
            authors: fields::parse_authors(entry.get("author").unwrap_or_default(), &self.config.email_domain),
            edition_id,
            abstract_text: entry.get("abstract").map(str::trim).unwrap_or_default().to_string(),
            keywords: fields::parse_keywords(entry.get("keywords").unwrap_or_default()),
            pdf_ref: String::new(),
            created_at: Some(Utc::now()),
            title_key: match self.config.title_match {
                TitleMatch::Exact => None,
                TitleMatch::Normalized => Some(title_key(title)),
            },
        };
        let article_id = self
            .store
            .insert(Collection::Articles, to_document(&article)?)
            .await?;

        Ok(EntryOutcome::Created { article_id })
    }

    async fn article_exists(&self, title: &str) -> IngestionResult<bool> {
        let filter = match self.config.title_match {
            TitleMatch::Exact => Filter::eq(field::TITLE, title),
            // Articles stored before normalized matching was enabled have no
            // title_key; fall back to their exact title.
            TitleMatch::Normalized => Filter::or(vec![
                Filter::eq(field::TITLE_KEY, title_key(title)),
                Filter::eq(field::TITLE, title),
            ]),
        };
        Ok(self.store.count(Collection::Articles, &filter).await? > 0)
    }

    async fn find_or_create_event(&self, venue: &Venue) -> IngestionResult<(DocRef, bool)> {
        let filter = Filter::eq(field::ACRONYM, venue.acronym());
        if let Some(existing) = self.store.find_one(Collection::Events, &filter).await? {
            return Ok((require_id(&existing, Collection::Events)?, false));
        }

        let event = Event {
            id: None,
            name: venue.name().to_string(),
            acronym: venue.acronym().to_string(),
            description: venue.description(),
        };
        let id = self.store.insert(Collection::Events, to_document(&event)?).await?;
        debug!(acronym = venue.acronym(), event = %id, "created event");
        Ok((id, true))
    }

    async fn find_or_create_edition(
        &self,
        event_id: &DocRef,
        year: i32,
        location: &str,
    ) -> IngestionResult<(DocRef, bool)> {
        let filter = Filter::and(vec![
            Filter::eq(field::EVENT_ID, event_id),
            Filter::eq(field::YEAR, year),
        ]);
        if let Some(existing) = self.store.find_one(Collection::Editions, &filter).await? {
            return Ok((require_id(&existing, Collection::Editions)?, false));
        }

        let edition = Edition::whole_year(event_id.clone(), year, location);
        let id = self.store.insert(Collection::Editions, to_document(&edition)?).await?;
        debug!(event = %event_id, year, edition = %id, "created edition");
        Ok((id, true))
    }
}

fn require_id(doc: &Document, collection: Collection) -> IngestionResult<DocRef> {
    document_id(doc).ok_or_else(|| {
        IngestionError::Storage(StorageError::SchemaError(format!(
            "{collection} document without a usable _id"
        )))
    })
}

//! Bibliography provider module.
//!
//! This module defines the interface for sourcing bibliography entries and
//! includes the BibTeX implementation.
//!
//! The `BibliographyProvider` trait abstracts where entries come from, so the
//! ingestion pipeline can work on an uploaded payload, a seed file on disk, or
//! a hand-built batch in a test without caring which.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

pub mod bibtex;

/// Errors that can occur when reading bibliography entries.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to read from the data source
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The payload is not in a format this provider understands
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The payload is in the right format but malformed
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// One flat bibliography record.
///
/// Field names are lower-cased; values are plain text with markup braces
/// removed. The pipeline reads `title`, `author`, `year`, `booktitle`,
/// `abstract`, `keywords` and `address` and ignores the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BibEntry {
    /// Citation key
    pub id: String,

    /// Entry type (`inproceedings`, `article`, ...)
    pub entry_type: String,

    pub fields: BTreeMap<String, String>,
}

impl BibEntry {
    pub fn new(id: impl Into<String>, entry_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entry_type: entry_type.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_lowercase(), value.into());
        self
    }

    /// Look up a field by (case-insensitive) name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// Trait for sourcing bibliography entries.
///
/// # Design Notes
///
/// - Providers return entries as-is; deduplication and identity resolution
///   happen in the ingestion pipeline
/// - Format problems are reported here, before the pipeline touches the store
#[async_trait]
pub trait BibliographyProvider: Send + Sync {
    /// Fetch every entry from this provider, in source order.
    ///
    /// # Errors
    /// Returns `ProviderError` if the entries cannot be read or parsed
    async fn fetch_entries(&self) -> ProviderResult<Vec<BibEntry>>;

    /// Number of entries available.
    async fn count_entries(&self) -> ProviderResult<usize> {
        self.fetch_entries().await.map(|entries| entries.len())
    }

    /// Human-readable name, for logging.
    fn name(&self) -> &str;
}

/// Provider over an already-parsed batch.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    entries: Vec<BibEntry>,
}

impl StaticProvider {
    pub fn new(entries: Vec<BibEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl BibliographyProvider for StaticProvider {
    async fn fetch_entries(&self) -> ProviderResult<Vec<BibEntry>> {
        Ok(self.entries.clone())
    }

    async fn count_entries(&self) -> ProviderResult<usize> {
        Ok(self.entries.len())
    }

    fn name(&self) -> &str {
        "static"
    }
}

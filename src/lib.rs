//! Event Catalog - bibliographic ingestion and federated search for academic events.
//!
//! This library catalogs academic events, their yearly editions, and the
//! articles published in them. Entities live in a schemaless document store
//! with three collections and no cross-collection joins.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **models**: Core data structures (Event, Edition, Article, Author, DocRef)
//! - **text**: Shared normalization and case-insensitive matching
//! - **storage**: Document store interface plus in-memory and SQLite backends
//! - **provider**: Bibliography sources, including the BibTeX parser
//! - **ingestion**: Bulk import pipeline with deduplication and run reports
//! - **query**: Federated search and read-only catalog pages
//!
//! # Workflow
//!
//! ## Ingestion
//!
//! 1. Parse a bibliography payload into flat entries
//! 2. Skip entries whose title is already cataloged
//! 3. Classify each entry's venue and find or create its Event and Edition
//! 4. Store the Article and record the outcome in the run report
//!
//! ## Search
//!
//! 1. Validate the query and resolve the search mode
//! 2. Match titles, author names, or events (through their editions)
//! 3. Merge and deduplicate the article sets
//! 4. Enrich each article with its edition year and event identity
//!
//! # Example
//!
//! ```ignore
//! use event_catalog::{
//!     ingestion::IngestionPipeline,
//!     query::{FederatedSearchEngine, SearchEngine, SearchMode, SearchQuery},
//!     storage::sqlite::SqliteStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::open("catalog.db")?);
//!
//!     let pipeline = IngestionPipeline::new(Arc::clone(&store));
//!     let report = pipeline.ingest_bibtex(&std::fs::read("sbes2024.bib")?).await?;
//!     println!("{} articles created", report.articles_created);
//!
//!     let engine = FederatedSearchEngine::new(store);
//!     let results = engine.search(&SearchQuery::new("learning", SearchMode::All)).await?;
//!     for result in results {
//!         println!("{} ({:?})", result.article.title, result.edition_year);
//!     }
//!
//!     Ok(())
//! }
//! ```

// Public modules
pub mod ingestion;
pub mod models;
pub mod provider;
pub mod query;
pub mod storage;
pub mod text;

// Re-export commonly used types at the crate root
pub use ingestion::{IngestionConfig, IngestionPipeline, IngestionReport, TitleMatch};
pub use models::{Article, Author, DocRef, Edition, Event};
pub use provider::{BibEntry, BibliographyProvider};
pub use query::{FederatedSearchEngine, SearchEngine, SearchMode, SearchQuery, SearchRequest, SearchResponse};
pub use storage::{CatalogStore, Collection, Filter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name of the catalog database inside the data directory
pub const DEFAULT_DB_FILE: &str = "catalog.db";

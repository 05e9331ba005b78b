//! Catalog browsing.
//!
//! Read-only pages over the catalog: an event with its editions, an edition
//! with its articles, and everything an author has published. Like search,
//! these resolve references in application code and tolerate both reference
//! representations.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::warn;

use super::QueryResult;
use crate::models::{field, Article, DocRef, Edition, Event};
use crate::storage::{document_id, from_document, CatalogStore, Collection, Document, Filter};

/// An event and its editions, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventPage {
    pub event: Event,
    pub editions: Vec<Edition>,
}

/// One edition of an event and the articles published in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditionPage {
    pub event: Event,
    pub edition: Edition,
    pub articles: Vec<Article>,
}

/// Articles of one edition year on an author page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearGroup {
    pub year: i32,
    pub articles: Vec<Article>,
}

/// Everything published by authors whose name contains a given string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorPage {
    pub name: String,

    /// Years descending
    pub years: Vec<YearGroup>,

    /// Every matching article, including those whose edition is missing
    pub total: usize,
}

/// Read-only view of the catalog.
pub struct CatalogBrowser<S>
where
    S: CatalogStore,
{
    store: S,
}

impl<S> CatalogBrowser<S>
where
    S: CatalogStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Look up an event by acronym, with its editions newest first.
    ///
    /// # Returns
    /// `None` if no event has this acronym
    pub async fn event_page(&self, acronym: &str) -> QueryResult<Option<EventPage>> {
        let Some((event_id, event)) = self.event_by_acronym(acronym).await? else {
            return Ok(None);
        };

        let mut editions: Vec<Edition> = self
            .store
            .find(Collection::Editions, &Filter::eq(field::EVENT_ID, &event_id))
            .await?
            .into_iter()
            .filter_map(|doc| readable(doc, Collection::Editions))
            .collect();
        editions.sort_by(|a, b| b.year.cmp(&a.year));

        Ok(Some(EventPage { event, editions }))
    }

    /// Look up one edition of an event with its articles.
    ///
    /// # Returns
    /// `None` if the event or that year's edition does not exist
    pub async fn edition_page(&self, acronym: &str, year: i32) -> QueryResult<Option<EditionPage>> {
        let Some((event_id, event)) = self.event_by_acronym(acronym).await? else {
            return Ok(None);
        };

        let filter = Filter::and(vec![
            Filter::eq(field::EVENT_ID, &event_id),
            Filter::eq(field::YEAR, year),
        ]);
        let Some(doc) = self.store.find_one(Collection::Editions, &filter).await? else {
            return Ok(None);
        };
        let Some(edition_id) = document_id(&doc) else {
            return Ok(None);
        };
        let Some(edition) = readable::<Edition>(doc, Collection::Editions) else {
            return Ok(None);
        };

        let articles = self
            .store
            .find(Collection::Articles, &Filter::eq(field::EDITION_ID, &edition_id))
            .await?
            .into_iter()
            .filter_map(|doc| readable(doc, Collection::Articles))
            .collect();

        Ok(Some(EditionPage {
            event,
            edition,
            articles,
        }))
    }

    /// Collect an author's articles grouped by edition year.
    ///
    /// Articles whose edition cannot be resolved count towards `total` but
    /// appear in no year group.
    pub async fn author_page(&self, name: &str) -> QueryResult<AuthorPage> {
        let articles: Vec<Article> = self
            .store
            .find(Collection::Articles, &Filter::contains(field::AUTHOR_NAME, name))
            .await?
            .into_iter()
            .filter_map(|doc| readable(doc, Collection::Articles))
            .collect();
        let total = articles.len();

        let years: HashMap<DocRef, i32> = if articles.is_empty() {
            HashMap::new()
        } else {
            let edition_ids: Vec<DocRef> = articles.iter().map(|a| a.edition_id.clone()).collect();
            self.store
                .find(Collection::Editions, &Filter::is_in(field::ID, edition_ids))
                .await?
                .into_iter()
                .filter_map(|doc| {
                    let id = document_id(&doc)?;
                    let edition: Edition = readable(doc, Collection::Editions)?;
                    Some((id, edition.year))
                })
                .collect()
        };

        let mut grouped: BTreeMap<i32, Vec<Article>> = BTreeMap::new();
        for article in articles {
            match years.get(&article.edition_id) {
                Some(year) => grouped.entry(*year).or_default().push(article),
                None => warn!(
                    edition = %article.edition_id,
                    title = %article.title,
                    "article references a missing edition"
                ),
            }
        }

        Ok(AuthorPage {
            name: name.to_string(),
            years: grouped
                .into_iter()
                .rev()
                .map(|(year, articles)| YearGroup { year, articles })
                .collect(),
            total,
        })
    }

    async fn event_by_acronym(&self, acronym: &str) -> QueryResult<Option<(DocRef, Event)>> {
        let found = self
            .store
            .find_one(Collection::Events, &Filter::eq(field::ACRONYM, acronym))
            .await?;
        Ok(found.and_then(|doc| {
            let id = document_id(&doc)?;
            readable::<Event>(doc, Collection::Events).map(|event| (id, event))
        }))
    }
}

fn readable<T: serde::de::DeserializeOwned>(doc: Document, collection: Collection) -> Option<T> {
    match from_document(doc) {
        Ok(entity) => Some(entity),
        Err(e) => {
            warn!(%collection, error = %e, "skipping unreadable document");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    async fn browser() -> CatalogBrowser<InMemoryStore> {
        let store = InMemoryStore::new();
        store
            .insert(Collection::Events, doc(json!({"_id": "ev-sbes", "name": "SBES", "acronym": "SBES"})))
            .await
            .unwrap();
        for edition in [
            json!({"_id": "ed-2022", "event_id": {"$oid": "ev-sbes"}, "year": 2022, "location": "Uberlândia"}),
            json!({"_id": "ed-2024", "event_id": "ev-sbes", "year": 2024, "location": "Curitiba"}),
            json!({"_id": "ed-2023", "event_id": "ev-sbes", "year": 2023, "location": "Campo Grande"}),
        ] {
            store.insert(Collection::Editions, doc(edition)).await.unwrap();
        }
        for article in [
            json!({"_id": "a1", "title": "Testes de Mutação",
                   "authors": [{"name": "Maria Santos"}], "edition_id": "ed-2022"}),
            json!({"_id": "a2", "title": "Machine Learning em Python",
                   "authors": [{"name": "João Silva"}, {"name": "Maria Santos"}], "edition_id": "ed-2024"}),
            json!({"_id": "a3", "title": "Compiladores",
                   "authors": [{"name": "maria santos"}], "edition_id": "ed-2024"}),
            json!({"_id": "a4", "title": "Lost", "authors": [{"name": "Maria Santos"}], "edition_id": "ed-gone"}),
        ] {
            store.insert(Collection::Articles, doc(article)).await.unwrap();
        }
        CatalogBrowser::new(store)
    }

    #[tokio::test]
    async fn test_event_page_lists_editions_newest_first() {
        let browser = browser().await;

        let page = browser.event_page("SBES").await.unwrap().unwrap();
        assert_eq!(page.event.acronym, "SBES");
        let years: Vec<_> = page.editions.iter().map(|e| e.year).collect();
        assert_eq!(years, vec![2024, 2023, 2022]);

        assert!(browser.event_page("ICSE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_edition_page() {
        let browser = browser().await;

        let page = browser.edition_page("SBES", 2024).await.unwrap().unwrap();
        assert_eq!(page.edition.location, "Curitiba");
        let titles: Vec<_> = page.articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Machine Learning em Python", "Compiladores"]);

        // Legacy native event reference
        let page = browser.edition_page("SBES", 2022).await.unwrap().unwrap();
        assert_eq!(page.articles.len(), 1);

        assert!(browser.edition_page("SBES", 1999).await.unwrap().is_none());
        assert!(browser.edition_page("ICSE", 2024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_author_page_groups_by_year() {
        let browser = browser().await;

        let page = browser.author_page("santos").await.unwrap();
        assert_eq!(page.total, 4);
        let groups: Vec<_> = page
            .years
            .iter()
            .map(|g| (g.year, g.articles.iter().map(|a| a.title.as_str()).collect::<Vec<_>>()))
            .collect();
        assert_eq!(
            groups,
            vec![
                (2024, vec!["Machine Learning em Python", "Compiladores"]),
                (2022, vec!["Testes de Mutação"]),
            ]
        );

        let nobody = browser.author_page("Nobody").await.unwrap();
        assert_eq!(nobody.total, 0);
        assert!(nobody.years.is_empty());
    }
}

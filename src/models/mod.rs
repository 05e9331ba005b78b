//! Core data models for the event catalog.
//!
//! This module contains the three catalog entities (events, their yearly
//! editions, and the articles published in them) plus the reference type that
//! links them together.
//!
//! The store has no foreign keys. Editions point at events and articles point
//! at editions through [`DocRef`] values, which is also where historical data
//! quirks are absorbed: a reference may have been written either as a plain
//! string or as a native `{"$oid": "..."}` object, and both read back as the
//! same canonical string.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

/// Stored field names, shared by the write path and the filters on the read path.
pub mod field {
    pub const ID: &str = "_id";

    pub const NAME: &str = "name";
    pub const ACRONYM: &str = "acronym";

    pub const EVENT_ID: &str = "event_id";
    pub const YEAR: &str = "year";

    pub const TITLE: &str = "title";
    pub const TITLE_KEY: &str = "title_key";
    pub const AUTHOR_NAME: &str = "authors.name";
    pub const EDITION_ID: &str = "edition_id";
    pub const PDF_REF: &str = "pdf_ref";
}

/// Canonical form of a document reference.
///
/// Equality, hashing and set membership on references always go through this
/// type, never through the raw stored JSON value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocRef(String);

impl DocRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier for a new document.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonicalize a stored reference value.
    ///
    /// Accepts a plain string or the native `{"$oid": "..."}` form; anything
    /// else is not a reference.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Object(map) if map.len() == 1 => map
                .get("$oid")
                .and_then(Value::as_str)
                .map(|s| Self(s.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DocRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<DocRef> for Value {
    fn from(value: DocRef) -> Self {
        Value::String(value.0)
    }
}

impl From<&DocRef> for Value {
    fn from(value: &DocRef) -> Self {
        Value::String(value.0.clone())
    }
}

impl Serialize for DocRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DocRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawRef {
            Plain(String),
            Native {
                #[serde(rename = "$oid")]
                oid: String,
            },
        }

        Ok(match RawRef::deserialize(deserializer)? {
            RawRef::Plain(id) => Self(id),
            RawRef::Native { oid } => Self(oid),
        })
    }
}

/// A recurring named venue (conference, symposium, workshop).
///
/// `acronym` is the identity key in practice: lookups take the first event
/// with an equal acronym, but the store does not enforce uniqueness.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocRef>,

    pub name: String,

    pub acronym: String,

    #[serde(default)]
    pub description: String,
}

/// One year's instance of an [`Event`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edition {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocRef>,

    /// Owning event (reference, not an owning pointer)
    pub event_id: DocRef,

    pub year: i32,

    #[serde(default)]
    pub location: String,

    /// ISO date (`YYYY-MM-DD`)
    #[serde(default)]
    pub start_date: String,

    /// ISO date (`YYYY-MM-DD`)
    #[serde(default)]
    pub end_date: String,
}

impl Edition {
    /// Build an edition spanning the whole calendar year.
    ///
    /// Imported bibliographies only carry a year, so the dates are synthetic.
    pub fn whole_year(event_id: DocRef, year: i32, location: impl Into<String>) -> Self {
        Self {
            id: None,
            event_id,
            year,
            location: location.into(),
            start_date: format!("{year:04}-01-01"),
            end_date: format!("{year:04}-12-31"),
        }
    }
}

/// An article author.
///
/// Imported authors get a placeholder email derived from their last name; it
/// is never validated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Author {
    pub name: String,

    #[serde(default)]
    pub email: String,
}

/// A publication belonging to one [`Edition`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocRef>,

    pub title: String,

    /// Authors in source order
    #[serde(default)]
    pub authors: Vec<Author>,

    pub edition_id: DocRef,

    #[serde(rename = "abstract", default)]
    pub abstract_text: String,

    #[serde(default)]
    pub keywords: Vec<String>,

    /// Stored PDF location; empty until the upload flow attaches one
    #[serde(default)]
    pub pdf_ref: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Normalized dedup key, only written under normalized title matching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_doc_ref_from_value_accepts_both_forms() {
        let plain = json!("65f0c0ffee");
        let native = json!({"$oid": "65f0c0ffee"});

        assert_eq!(DocRef::from_value(&plain), DocRef::from_value(&native));
        assert_eq!(DocRef::from_value(&plain).unwrap().as_str(), "65f0c0ffee");
        assert!(DocRef::from_value(&json!(42)).is_none());
        assert!(DocRef::from_value(&json!({"$oid": "a", "extra": 1})).is_none());
    }

    #[test]
    fn test_edition_deserializes_native_event_ref() {
        let legacy = json!({
            "_id": {"$oid": "ed1"},
            "event_id": {"$oid": "ev1"},
            "year": 2023
        });
        let edition: Edition = serde_json::from_value(legacy).unwrap();

        assert_eq!(edition.id, Some(DocRef::new("ed1")));
        assert_eq!(edition.event_id, DocRef::new("ev1"));
        assert_eq!(edition.location, "");

        // References always serialize back as plain strings
        let value = serde_json::to_value(&edition).unwrap();
        assert_eq!(value["event_id"], json!("ev1"));
    }

    #[test]
    fn test_whole_year_edition_dates() {
        let edition = Edition::whole_year(DocRef::new("ev"), 2024, "Recife");
        assert_eq!(edition.start_date, "2024-01-01");
        assert_eq!(edition.end_date, "2024-12-31");
        assert_eq!(edition.location, "Recife");
    }

    #[test]
    fn test_article_field_names() {
        let article = Article {
            id: None,
            title: "Deep Learning com TensorFlow".to_string(),
            authors: vec![Author {
                name: "Ana Silva".to_string(),
                email: "silva@email.com".to_string(),
            }],
            edition_id: DocRef::new("ed"),
            abstract_text: "Resumo".to_string(),
            keywords: vec!["ml".to_string()],
            pdf_ref: String::new(),
            created_at: None,
            title_key: None,
        };
        let value = serde_json::to_value(&article).unwrap();

        assert!(value.get("_id").is_none());
        assert_eq!(value["abstract"], json!("Resumo"));
        assert_eq!(value["authors"][0]["name"], json!("Ana Silva"));
        assert!(value.get("title_key").is_none());
    }
}

//! Document filters.
//!
//! A [`Filter`] is a small predicate language over JSON documents, just rich
//! enough for the catalog's read paths:
//!
//! - exact match (`Eq`)
//! - case-insensitive substring match on strings (`Contains`)
//! - value-in-set match (`In`)
//! - conjunction and disjunction
//!
//! Field names are dotted paths. A path segment that lands on an array fans
//! out over its elements, so `authors.name` matches when *any* author's name
//! matches, and a filter on `keywords` matches when any keyword does.
//!
//! Equality between two reference-shaped values (plain strings or the native
//! `{"$oid": ...}` form) is decided on their canonical string form, so
//! historical data written either way compares equal.

use serde_json::Value;

use super::Document;
use crate::models::DocRef;
use crate::text::contains_ignore_case;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document
    All,

    /// Field equals value
    Eq(String, Value),

    /// Field is a string containing the needle, ignoring case
    Contains(String, String),

    /// Field equals one of the values
    In(String, Vec<Value>),

    /// Every sub-filter matches
    And(Vec<Filter>),

    /// At least one sub-filter matches
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn contains(field: &str, needle: &str) -> Self {
        Filter::Contains(field.to_string(), needle.to_string())
    }

    pub fn is_in<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In(field.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    /// Evaluate the filter against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(path, expected) => {
                values_at(doc, path).into_iter().any(|v| values_equal(v, expected))
            }
            Filter::Contains(path, needle) => values_at(doc, path)
                .into_iter()
                .any(|v| v.as_str().is_some_and(|s| contains_ignore_case(s, needle))),
            Filter::In(path, candidates) => values_at(doc, path)
                .into_iter()
                .any(|v| candidates.iter().any(|c| values_equal(v, c))),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
        }
    }

    /// The identifier this filter pins down, when it is a plain `_id` lookup.
    ///
    /// Backends use it to skip a full scan.
    pub fn exact_id(&self) -> Option<DocRef> {
        match self {
            Filter::Eq(path, value) if path == crate::models::field::ID => DocRef::from_value(value),
            _ => None,
        }
    }
}

/// Resolve a dotted path, fanning out over arrays.
///
/// A missing segment yields nothing; a terminal array yields its elements.
fn values_at<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Vec::new();
    };
    let mut current: Vec<&Value> = doc.get(first).into_iter().collect();

    for segment in segments {
        current = current
            .into_iter()
            .flat_map(|value| match value {
                Value::Array(items) => items.iter().collect::<Vec<_>>(),
                other => vec![other],
            })
            .filter_map(|value| value.as_object().and_then(|obj| obj.get(segment)))
            .collect();
    }

    current
        .into_iter()
        .flat_map(|value| match value {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect()
}

fn values_equal(stored: &Value, expected: &Value) -> bool {
    match (DocRef::from_value(stored), DocRef::from_value(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => stored == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_eq_on_scalar_fields() {
        let edition = doc(json!({"event_id": "ev1", "year": 2024}));

        assert!(Filter::eq("year", 2024).matches(&edition));
        assert!(!Filter::eq("year", 2023).matches(&edition));
        assert!(!Filter::eq("missing", 2024).matches(&edition));
    }

    #[test]
    fn test_reference_equality_ignores_representation() {
        let native = doc(json!({"event_id": {"$oid": "ev1"}, "year": 2024}));
        let plain = doc(json!({"event_id": "ev1", "year": 2024}));

        for edition in [&native, &plain] {
            assert!(Filter::eq("event_id", "ev1").matches(edition));
            assert!(Filter::eq("event_id", json!({"$oid": "ev1"})).matches(edition));
            assert!(Filter::is_in("event_id", ["ev0", "ev1"]).matches(edition));
        }
        assert!(!Filter::eq("event_id", "ev2").matches(&native));
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let article = doc(json!({"title": "Machine Learning em Python"}));

        assert!(Filter::contains("title", "learning").matches(&article));
        assert!(Filter::contains("title", "PYTHON").matches(&article));
        assert!(!Filter::contains("title", "Rust").matches(&article));
    }

    #[test]
    fn test_contains_ignores_non_strings() {
        let edition = doc(json!({"year": 2024}));
        assert!(!Filter::contains("year", "2024").matches(&edition));
    }

    #[test]
    fn test_dotted_path_fans_out_over_arrays() {
        let article = doc(json!({
            "authors": [
                {"name": "Ana Souza", "email": "souza@email.com"},
                {"name": "Bruno Anderson", "email": "anderson@email.com"}
            ],
            "keywords": ["testing", "mutation"]
        }));

        assert!(Filter::contains("authors.name", "anderson").matches(&article));
        assert!(Filter::contains("authors.name", "ana").matches(&article));
        assert!(!Filter::contains("authors.name", "carla").matches(&article));
        assert!(Filter::eq("keywords", "mutation").matches(&article));
    }

    #[test]
    fn test_boolean_combinators() {
        let event = doc(json!({"name": "Simpósio Brasileiro de Engenharia de Software", "acronym": "SBES"}));

        let by_name_or_acronym = Filter::or(vec![
            Filter::contains("name", "sbes"),
            Filter::contains("acronym", "sbes"),
        ]);
        assert!(by_name_or_acronym.matches(&event));

        let both = Filter::and(vec![
            Filter::contains("name", "engenharia"),
            Filter::eq("acronym", "ICSE"),
        ]);
        assert!(!both.matches(&event));

        assert!(Filter::All.matches(&event));
        assert!(!Filter::or(vec![]).matches(&event));
        assert!(Filter::and(vec![]).matches(&event));
    }

    #[test]
    fn test_in_with_empty_set_matches_nothing() {
        let article = doc(json!({"edition_id": "ed1"}));
        assert!(!Filter::is_in("edition_id", Vec::<Value>::new()).matches(&article));
    }

    #[test]
    fn test_exact_id() {
        assert_eq!(Filter::eq("_id", "abc").exact_id(), Some(DocRef::new("abc")));
        assert_eq!(Filter::eq("title", "abc").exact_id(), None);
        assert_eq!(Filter::All.exact_id(), None);
    }
}

//! Field parsing for bibliography entries.
//!
//! Bibliography fields arrive as free text; these helpers turn them into the
//! structured values stored on articles and editions.

use chrono::{Datelike, Utc};

use crate::models::Author;

/// Separator between author names in a BibTeX `author` field.
pub const AUTHOR_SEPARATOR: &str = " and ";

/// Split an `author` field into authors with placeholder emails.
///
/// Each segment is trimmed and empty segments are skipped. The email is the
/// last whitespace-delimited token of the name, lower-cased, at `email_domain`.
///
/// # Example
/// ```ignore
/// let authors = parse_authors("João Silva and Maria Santos", "email.com");
/// assert_eq!(authors[1].email, "santos@email.com");
/// ```
pub fn parse_authors(raw: &str, email_domain: &str) -> Vec<Author> {
    raw.split(AUTHOR_SEPARATOR)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            let last = name.split_whitespace().last().unwrap_or(name);
            Author {
                name: name.to_string(),
                email: format!("{}@{}", last.to_lowercase(), email_domain),
            }
        })
        .collect()
}

/// Split a `keywords` field on `,` or `;`.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a `year` field, defaulting to the current year.
pub fn parse_year(raw: Option<&str>) -> i32 {
    raw.and_then(|year| year.trim().parse::<i32>().ok())
        .unwrap_or_else(current_year)
}

pub fn current_year() -> i32 {
    Utc::now().year()
}

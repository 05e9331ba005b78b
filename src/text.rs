//! Text helpers shared by ingestion and search.
//!
//! Both sides of the catalog follow the same matching convention: string
//! containment, case-insensitive. Keeping the helpers in one place makes sure
//! a title that ingestion considers equal is also one search can find.

/// Normalizes text for use as a comparison key.
///
/// This function applies the following transformations:
/// - Converts to lowercase
/// - Trims leading/trailing whitespace
/// - Collapses runs of whitespace to a single space
///
/// # Example
/// ```
/// use event_catalog::text::normalize_text;
/// assert_eq!(normalize_text("  Deep   Learning "), "deep learning");
/// ```
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Case-insensitive substring test.
///
/// An empty needle matches everything, mirroring how an empty pattern
/// matches in a regex-based store.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

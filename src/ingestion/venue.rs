//! Venue classification.
//!
//! Turns an entry's `booktitle` into the identity of the event it belongs to.
//! Classification is pure: it never touches the store, so every rule here is
//! testable on its own.
//!
//! Rules, first match wins:
//! 1. the booktitle mentions a known venue (case-insensitive substring)
//! 2. otherwise an acronym is built from the capitalized initials of the
//!    first three words
//! 3. with no booktitle at all (or no usable initials) the fallback acronym
//!    is used

use crate::text::contains_ignore_case;

/// A venue with a fixed identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownVenue {
    pub acronym: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Substrings that identify the venue in a booktitle
    pub markers: &'static [&'static str],
}

/// Venues recognized by name, checked in order.
pub const KNOWN_VENUES: &[KnownVenue] = &[
    KnownVenue {
        acronym: "SBES",
        name: "Simpósio Brasileiro de Engenharia de Software",
        description: "Principal evento brasileiro dedicado à engenharia de software",
        markers: &["simpósio brasileiro", "sbes"],
    },
    KnownVenue {
        acronym: "ICSE",
        name: "International Conference on Software Engineering",
        description: "Premier international conference on software engineering",
        markers: &["icse"],
    },
];

/// Name given to events created for entries without any booktitle.
pub const UNKNOWN_VENUE_NAME: &str = "Unknown Conference";

/// Result of classifying a booktitle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Venue {
    /// One of [`KNOWN_VENUES`]
    Known(&'static KnownVenue),

    /// Derived from the booktitle itself
    Generic { acronym: String, name: String },

    /// No booktitle to go on
    Unknown { acronym: String },
}

impl Venue {
    /// Classify a booktitle. `fallback_acronym` is used when no acronym can
    /// be derived.
    pub fn classify(booktitle: Option<&str>, fallback_acronym: &str) -> Self {
        let booktitle = booktitle.map(str::trim).filter(|b| !b.is_empty());
        let Some(booktitle) = booktitle else {
            return Venue::Unknown {
                acronym: fallback_acronym.to_string(),
            };
        };

        if let Some(known) = KNOWN_VENUES
            .iter()
            .find(|venue| venue.markers.iter().any(|m| contains_ignore_case(booktitle, m)))
        {
            return Venue::Known(known);
        }

        let derived = derive_acronym(booktitle);
        Venue::Generic {
            acronym: if derived.is_empty() {
                fallback_acronym.to_string()
            } else {
                derived
            },
            name: booktitle.to_string(),
        }
    }

    pub fn acronym(&self) -> &str {
        match self {
            Venue::Known(known) => known.acronym,
            Venue::Generic { acronym, .. } | Venue::Unknown { acronym } => acronym,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Venue::Known(known) => known.name,
            Venue::Generic { name, .. } => name,
            Venue::Unknown { .. } => UNKNOWN_VENUE_NAME,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Venue::Known(known) => known.description.to_string(),
            Venue::Generic { name, .. } => format!("Conference: {name}"),
            Venue::Unknown { .. } => "Conference imported without venue information".to_string(),
        }
    }
}

/// Initials of the capitalized words among the first three words.
fn derive_acronym(booktitle: &str) -> String {
    booktitle
        .split_whitespace()
        .take(3)
        .filter_map(|word| word.chars().next())
        .filter(|initial| initial.is_uppercase())
        .flat_map(char::to_uppercase)
        .collect()
}

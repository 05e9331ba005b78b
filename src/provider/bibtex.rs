//! BibTeX provider implementation.
//!
//! A small hand-written parser for the subset of BibTeX that shows up in
//! exported proceedings:
//!
//! - `@type{key, field = {braced}, field = "quoted", field = 2024, ...}`
//!   with either `{}` or `()` as entry delimiters
//! - nested braces inside values
//! - `#` concatenation and `@string` macros
//! - `@comment` and `@preamble` blocks, which are skipped
//!
//! Values come out as plain text: markup braces are dropped and whitespace
//! (including line breaks inside long fields) is collapsed.
//!
//! Parsing is lenient. Text outside entries, including a stray `@` that is
//! not followed by an entry body, is treated as comment. A malformed entry is
//! skipped and recorded in [`ParsedBibliography::skipped`]; parsing resumes
//! at the next `@` that starts a line.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{BibEntry, BibliographyProvider, ProviderError, ProviderResult};

/// Provider over a BibTeX document.
#[derive(Debug, Clone)]
pub struct BibtexProvider {
    name: String,
    content: String,
}

impl BibtexProvider {
    /// Build a provider from an uploaded payload.
    ///
    /// # Errors
    /// Returns `ProviderError::UnsupportedFormat` if the payload is not UTF-8 text
    pub fn from_bytes(bytes: &[u8], name: impl Into<String>) -> ProviderResult<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ProviderError::UnsupportedFormat(format!("payload is not UTF-8 text: {e}")))?;
        Ok(Self {
            name: name.into(),
            content: text.trim_start_matches('\u{feff}').to_string(),
        })
    }

    /// Parse the payload, keeping track of entries that had to be skipped.
    pub fn document(&self) -> ParsedBibliography {
        parse(&self.content)
    }

    /// Build a provider from a `.bib` file on disk.
    ///
    /// # Errors
    /// Returns `ProviderError::UnsupportedFormat` for other extensions and
    /// `ProviderError::IoError` if the file cannot be read
    pub async fn from_file(path: impl Into<PathBuf>) -> ProviderResult<Self> {
        let path = path.into();
        if !has_bib_extension(&path) {
            return Err(ProviderError::UnsupportedFormat(format!(
                "only .bib files are accepted: {}",
                path.display()
            )));
        }
        let bytes = tokio::fs::read(&path).await?;
        Self::from_bytes(&bytes, path.display().to_string())
    }
}

fn has_bib_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("bib"))
}

#[async_trait]
impl BibliographyProvider for BibtexProvider {
    async fn fetch_entries(&self) -> ProviderResult<Vec<BibEntry>> {
        let document = self.document();
        for skipped in &document.skipped {
            warn!(
                source = %self.name,
                key = ?skipped.key,
                line = skipped.line,
                message = %skipped.message,
                "skipped malformed bibtex entry"
            );
        }
        debug!(source = %self.name, entries = document.entries.len(), "parsed bibtex");
        Ok(document.entries)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A malformed entry left out of a parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Citation key, when the parser got that far
    pub key: Option<String>,

    /// Line where the problem was found
    pub line: usize,

    pub message: String,
}

/// Result of parsing a whole BibTeX document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBibliography {
    /// Well-formed entries, in source order
    pub entries: Vec<BibEntry>,

    pub skipped: Vec<SkippedEntry>,
}

/// Parse a BibTeX document into flat entries, in source order.
pub fn parse(input: &str) -> ParsedBibliography {
    Parser::new(input).parse_all()
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    macros: HashMap<String, String>,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            macros: HashMap::new(),
        }
    }

    fn parse_all(mut self) -> ParsedBibliography {
        let mut document = ParsedBibliography::default();

        // Text between entries is an implicit comment
        while self.skip_to_at() {
            self.bump();
            let start = (self.pos, self.line);
            let kind = self.read_identifier().to_lowercase();
            self.skip_whitespace();
            let close = match self.peek() {
                Some('{') => '}',
                Some('(') => ')',
                // An '@' inside free text, e.g. an email address
                _ => continue,
            };
            self.bump();
            if kind.is_empty() {
                continue;
            }

            let mut key = None;
            let parsed = match kind.as_str() {
                "comment" | "preamble" => self.skip_balanced(close),
                "string" => self.parse_string_macro(close),
                _ => {
                    let citation_key = self.read_key(close);
                    if !citation_key.is_empty() {
                        key = Some(citation_key.clone());
                    }
                    match self.parse_fields(BibEntry::new(citation_key, kind), close) {
                        Ok(entry) => {
                            document.entries.push(entry);
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
            };

            if let Err(e) = parsed {
                let (line, message) = match e {
                    ProviderError::ParseError { line, message } => (line, message),
                    other => (start.1, other.to_string()),
                };
                document.skipped.push(SkippedEntry { key, line, message });
                (self.pos, self.line) = start;
                self.skip_to_line_start_at();
            }
        }

        document
    }

    fn read_key(&mut self, close: char) -> String {
        self.skip_whitespace();
        let mut key = String::new();
        while let Some(c) = self.peek() {
            if c == ',' || c == close || c.is_whitespace() {
                break;
            }
            key.push(c);
            self.bump();
        }
        key
    }

    fn parse_fields(&mut self, mut entry: BibEntry, close: char) -> ProviderResult<BibEntry> {
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(c) if c == close => {
                    self.bump();
                    return Ok(entry);
                }
                Some(_) => {
                    let (name, value) = self.parse_field()?;
                    entry.fields.insert(name, value);
                }
                None => {
                    return Err(self.error(&format!("unterminated entry '{}'", entry.id)));
                }
            }
        }
    }

    fn parse_string_macro(&mut self, close: char) -> ProviderResult<()> {
        self.skip_whitespace();
        let (name, value) = self.parse_field()?;
        self.macros.insert(name, value);
        self.skip_whitespace();
        match self.bump() {
            Some(c) if c == close => Ok(()),
            _ => Err(self.error("expected end of @string")),
        }
    }

    fn parse_field(&mut self) -> ProviderResult<(String, String)> {
        let name = self.read_identifier().to_lowercase();
        if name.is_empty() {
            return Err(self.error("expected field name"));
        }
        self.skip_whitespace();
        if self.bump() != Some('=') {
            return Err(self.error(&format!("expected '=' after field '{name}'")));
        }

        let mut value = String::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('{') => {
                    self.bump();
                    value.push_str(&self.read_delimited('}')?);
                }
                Some('"') => {
                    self.bump();
                    value.push_str(&self.read_delimited('"')?);
                }
                Some(c) if c.is_ascii_digit() => {
                    while let Some(d) = self.peek().filter(char::is_ascii_digit) {
                        value.push(d);
                        self.bump();
                    }
                }
                Some(c) if is_identifier_char(c) => {
                    let macro_name = self.read_identifier().to_lowercase();
                    let expanded = self.macros.get(&macro_name).cloned().unwrap_or(macro_name);
                    value.push_str(&expanded);
                }
                _ => return Err(self.error(&format!("expected value for field '{name}'"))),
            }

            self.skip_whitespace();
            if self.peek() == Some('#') {
                self.bump();
            } else {
                break;
            }
        }

        Ok((name, clean_value(&value)))
    }

    /// Read up to the matching terminator, honoring nested braces.
    fn read_delimited(&mut self, terminator: char) -> ProviderResult<String> {
        let start_line = self.line;
        let mut depth = 0usize;
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    out.push(c);
                    if let Some(escaped) = self.bump() {
                        out.push(escaped);
                    }
                }
                '{' => {
                    depth += 1;
                    out.push(c);
                }
                '}' if depth > 0 => {
                    depth -= 1;
                    out.push(c);
                }
                c if c == terminator && depth == 0 => return Ok(out),
                '}' => return Err(self.error("unbalanced '}' in value")),
                c => out.push(c),
            }
        }
        Err(ProviderError::ParseError {
            line: start_line,
            message: "unterminated value".to_string(),
        })
    }

    fn skip_balanced(&mut self, close: char) -> ProviderResult<()> {
        let open = if close == '}' { '{' } else { '(' };
        let start_line = self.line;
        let mut depth = 0usize;
        while let Some(c) = self.bump() {
            if c == open {
                depth += 1;
            } else if c == close {
                if depth == 0 {
                    return Ok(());
                }
                depth -= 1;
            }
        }
        Err(ProviderError::ParseError {
            line: start_line,
            message: "unterminated block".to_string(),
        })
    }

    fn skip_to_at(&mut self) -> bool {
        while let Some(c) = self.peek() {
            if c == '@' {
                return true;
            }
            self.bump();
        }
        false
    }

    /// Move to the next '@' preceded only by whitespace on its line.
    fn skip_to_line_start_at(&mut self) {
        let mut at_line_start = false;
        while let Some(c) = self.peek() {
            if c == '@' && at_line_start {
                return;
            }
            if c == '\n' {
                at_line_start = true;
            } else if !c.is_whitespace() {
                at_line_start = false;
            }
            self.bump();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.peek().filter(|c| is_identifier_char(*c)) {
            ident.push(c);
            self.bump();
        }
        ident
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn error(&self, message: &str) -> ProviderError {
        ProviderError::ParseError {
            line: self.line,
            message: message.to_string(),
        }
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.' | '+' | '/')
}

fn clean_value(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '{' && *c != '}')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

//! In-memory credential store loaded from a two-column CSV file

use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Identifier (callsign) to secret mapping
///
/// A store is a read-only snapshot: sessions only ever look entries up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialStore {
    entries: HashMap<String, String>,
}

/// Statistics gathered while parsing a credential source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Rows accepted as credentials (including ones later overridden)
    pub accepted: usize,
    /// Rows skipped because they did not have exactly two columns
    pub skipped: usize,
    /// Rows that replaced an earlier entry with the same identifier
    pub duplicates: usize,
}

impl CredentialStore {
    /// Create an empty store; nobody can authenticate against it
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse CSV text
    pub fn parse(text: &str) -> Self {
        Self::parse_with_report(text).0
    }

    /// Parse CSV text and report what was accepted and skipped
    ///
    /// Rows with a column count other than two are skipped, which lets header,
    /// footer and blank lines through without special handling. A later row
    /// for the same identifier replaces the earlier one.
    pub fn parse_with_report(text: &str) -> (Self, LoadReport) {
        let mut entries = HashMap::new();
        let mut report = LoadReport::default();

        for mut fields in csv_records(text) {
            if fields.len() != 2 {
                report.skipped += 1;
                continue;
            }

            let secret = fields.pop().unwrap_or_default();
            let identifier = fields.pop().unwrap_or_default();
            if entries.insert(identifier, secret).is_some() {
                report.duplicates += 1;
            }
            report.accepted += 1;
        }

        (Self { entries }, report)
    }

    /// Load a credential file, failing if it cannot be read
    pub async fn try_load(path: &Path) -> Result<(Self, LoadReport)> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            Error::Credentials(format!(
                "Failed to read credential file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(Self::parse_with_report(&text))
    }

    /// Load a credential file, degrading to an empty store on any read error
    ///
    /// An empty store makes every authentication attempt fail, so a missing
    /// file keeps the proxy running but closed to everyone.
    pub async fn load(path: &Path) -> Self {
        match Self::try_load(path).await {
            Ok((store, report)) => {
                debug!(
                    path = %path.display(),
                    entries = store.len(),
                    skipped = report.skipped,
                    "Loaded credentials"
                );
                store
            }
            Err(e) => {
                warn!(error = %e, "Credential file unavailable, all logins will be refused");
                Self::new()
            }
        }
    }

    /// Secret stored for an identifier
    pub fn lookup(&self, identifier: &str) -> Option<&str> {
        self.entries.get(identifier).map(String::as_str)
    }

    /// Whether the identifier is known and the secret matches exactly
    pub fn verify(&self, identifier: &str, secret: &str) -> bool {
        self.lookup(identifier) == Some(secret)
    }

    /// Whether the identifier is known
    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    /// Number of distinct identifiers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identifiers in sorted order
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// Split CSV text into rows of fields
///
/// Double-quoted fields may contain commas and line breaks, and `""` inside a
/// quoted field stands for a literal quote. Unquoted fields are taken
/// verbatim. Rows end at `\n` or `\r\n` outside quotes; empty lines yield no row.
fn csv_records(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    // The current field opened with a quote, so an empty value is still a value
    let mut quoted = false;
    let mut chars = text.chars().peekable();

    let mut end_row = |fields: &mut Vec<String>, field: &mut String, quoted: &mut bool| {
        let blank = fields.is_empty() && field.is_empty() && !*quoted;
        fields.push(std::mem::take(field));
        let row = std::mem::take(fields);
        if !blank {
            rows.push(row);
        }
        *quoted = false;
    };

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.is_empty() && !quoted => {
                in_quotes = true;
                quoted = true;
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
                quoted = false;
            }
            '\r' if !in_quotes && matches!(chars.peek(), Some('\n') | None) => {}
            '\n' if !in_quotes => end_row(&mut fields, &mut field, &mut quoted),
            _ => field.push(c),
        }
    }
    end_row(&mut fields, &mut field, &mut quoted);

    rows
}

//! Fuzzy lookup of people in a CSV register.
//!
//! One column is indexed (`Surname` by default) and queries are scored
//! against it; another column (`Full Name`) is what gets reported.
//! Scores run from 0 (exact) to 1 (nothing in common).

use anyhow::{Context, Result};
use std::fmt;
use std::io;
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_KEY_COLUMN: &str = "Surname";
pub const DEFAULT_DISPLAY_COLUMN: &str = "Full Name";
pub const DEFAULT_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub struct NameRecord {
    pub key: String,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NameMatch {
    pub key: String,
    pub display: String,
    pub score: f64,
}

impl fmt::Display for NameMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2})", self.display, self.score)
    }
}

#[derive(Debug, Default)]
pub struct NameIndex {
    records: Vec<NameRecord>,
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .with_context(|| format!("CSV has no column named '{}'", name))
}

/// Substring hits score at most 0.5; everything else uses edit distance.
fn score(query: &str, key: &str) -> f64 {
    let query = query.to_lowercase();
    let key = key.to_lowercase();
    if key.contains(&query) {
        let coverage = query.chars().count() as f64 / key.chars().count() as f64;
        0.5 * (1.0 - coverage)
    } else {
        1.0 - strsim::normalized_levenshtein(&query, &key)
    }
}

impl NameIndex {
    pub fn from_reader<R: io::Read>(
        reader: R,
        key_column: &str,
        display_column: &str,
    ) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = rdr.headers().context("Failed to read CSV header")?.clone();
        let key_idx = column_index(&headers, key_column)?;
        let display_idx = column_index(&headers, display_column)?;

        let mut records = Vec::new();
        for (line, row) in rdr.records().enumerate() {
            let row = row.with_context(|| format!("Malformed CSV row {}", line + 2))?;
            let key = row.get(key_idx).unwrap_or_default().trim();
            if key.is_empty() {
                debug!("Skipping row {} with empty {}", line + 2, key_column);
                continue;
            }
            records.push(NameRecord {
                key: key.to_string(),
                display: row.get(display_idx).unwrap_or_default().trim().to_string(),
            });
        }
        info!("Indexed {} records on column '{}'", records.len(), key_column);
        Ok(Self { records })
    }

    pub fn from_path(path: &Path, key_column: &str, display_column: &str) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open CSV: {}", path.display()))?;
        Self::from_reader(file, key_column, display_column)
            .with_context(|| format!("Failed to load CSV: {}", path.display()))
    }

    /// Matches with `score <= threshold`, best first; equal scores keep file order.
    pub fn search(&self, query: &str, threshold: f64) -> Vec<NameMatch> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<NameMatch> = self
            .records
            .iter()
            .filter_map(|record| {
                let score = score(query, &record.key);
                (score <= threshold).then(|| NameMatch {
                    key: record.key.clone(),
                    display: record.display.clone(),
                    score,
                })
            })
            .collect();
        matches.sort_by(|a, b| a.score.total_cmp(&b.score));
        debug!("Query '{}' matched {} records", query, matches.len());
        matches
    }
}

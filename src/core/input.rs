// src/core/input.rs

//! Readers for the plain-text domain and term lists.

use std::path::Path;
use tracing::{debug, info};

use crate::core::error::ConfigurationError;

/// Reads a search-term file: one term per line, surrounding whitespace
/// trimmed, blank lines skipped, duplicates dropped (first one wins).
pub async fn read_terms(path: &Path) -> Result<Vec<String>, ConfigurationError> {
    let text = read_to_string(path).await?;
    let mut terms: Vec<String> = Vec::new();
    for term in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !terms.iter().any(|t| t == term) {
            terms.push(term.to_string());
        }
    }
    info!(path = %path.display(), count = terms.len(), "Loaded search terms.");
    Ok(terms)
}

/// Splits an inline `a, b, c` term list.
pub fn parse_terms_inline(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Reads a domain list file.
pub async fn read_domains(path: &Path) -> Result<Vec<String>, ConfigurationError> {
    let text = read_to_string(path).await?;
    let domains = parse_domains(&text);
    info!(path = %path.display(), count = domains.len(), "Loaded domain list.");
    Ok(domains)
}

/// One domain per line. Blank lines are ignored; the rest is kept raw for
/// the normalizer.
pub fn parse_domains(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

async fn read_to_string(path: &Path) -> Result<String, ConfigurationError> {
    debug!(path = %path.display(), "Reading input file.");
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| ConfigurationError::UnreadableInput {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// src/core/scanner/matcher.rs

use reqwest::header::HeaderMap;

/// Literal, case-sensitive term search over a response.
///
/// No regex and no normalisation: a term hits only if its exact bytes
/// appear in the body or in the serialised headers.
#[derive(Debug, Clone)]
pub struct TermMatcher {
    terms: Vec<String>,
}

impl TermMatcher {
    pub fn new(terms: Vec<String>) -> Self {
        Self { terms }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Returns the terms found in `body` or `headers`, in configured order.
    /// An empty vector means no match.
    pub fn find_matches(&self, body: &str, headers: &str) -> Vec<String> {
        self.terms
            .iter()
            .filter(|term| body.contains(term.as_str()) || headers.contains(term.as_str()))
            .cloned()
            .collect()
    }
}

/// Serialises response headers one per line as `Name: value`. Names are
/// written in canonical Title-Case since reqwest stores them lowercased and
/// terms like `Server: Apache` must still hit. Values that are not valid
/// UTF-8 are converted lossily so their readable parts can still match.
pub fn serialize_headers(headers: &HeaderMap) -> String {
    let mut out = String::new();
    for (name, value) in headers {
        push_canonical_name(&mut out, name.as_str());
        out.push_str(": ");
        out.push_str(&String::from_utf8_lossy(value.as_bytes()));
        out.push('\n');
    }
    out
}

/// `x-powered-by` -> `X-Powered-By`.
fn push_canonical_name(out: &mut String, name: &str) {
    for (i, segment) in name.split('-').enumerate() {
        if i > 0 {
            out.push('-');
        }
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
        }
    }
}

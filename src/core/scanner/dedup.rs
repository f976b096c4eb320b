// src/core/scanner/dedup.rs

use std::collections::HashSet;
use std::sync::Mutex;

use crate::core::models::MatchRecord;

/// Collapses the per-protocol hits of one domain into a single record.
///
/// The first hit in probe order supplies the reported protocol; matched
/// terms are the union across hits in first-seen order. Hits are expected
/// to belong to the same domain.
pub fn merge_domain_hits(hits: Vec<MatchRecord>) -> Option<MatchRecord> {
    let mut hits = hits.into_iter();
    let mut merged = hits.next()?;
    for hit in hits {
        debug_assert_eq!(hit.domain, merged.domain);
        for term in hit.matched_terms {
            if !merged.matched_terms.contains(&term) {
                merged.matched_terms.push(term);
            }
        }
    }
    Some(merged)
}

/// Domains already claimed in the current scan. Lives as long as the scan
/// and is dropped with it.
#[derive(Debug, Default)]
pub struct SeenDomains {
    inner: Mutex<HashSet<String>>,
}

impl SeenDomains {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `domain` for this scan. Returns `false` when it was already
    /// claimed.
    pub fn claim(&self, domain: &str) -> bool {
        let mut seen = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        seen.insert(domain.to_string())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Free-text location resolution
//!
//! Two phases over the vocabulary, O(n) per query:
//! 1. case-insensitive exact match
//! 2. first entry (vocabulary order) containing the query as a substring
//!
//! Phase 2 is first-wins, not best-match, so results are reproducible.

use crate::{LocationVocabulary, Result, RiskError, MAX_HINTS};
use tracing::debug;

/// Resolve a raw location string to its canonical vocabulary name
pub fn resolve<'v>(vocabulary: &'v LocationVocabulary, raw: &str) -> Result<&'v str> {
    let query = raw.trim();
    if query.is_empty() {
        return Err(RiskError::InvalidInput("location is required".to_string()));
    }
    let query = query.to_lowercase();

    if let Some(name) = vocabulary
        .code(&query)
        .and_then(|code| vocabulary.name(code))
    {
        debug!("Resolved {:?} -> {:?} (exact)", raw, name);
        return Ok(name);
    }

    if let Some((name, _)) = vocabulary
        .iter_lowercase()
        .find(|(_, lower)| lower.contains(query.as_str()))
    {
        debug!("Resolved {:?} -> {:?} (substring)", raw, name);
        return Ok(name);
    }

    Err(RiskError::NotFound {
        query: raw.trim().to_string(),
        hints: vocabulary.sample(MAX_HINTS),
    })
}

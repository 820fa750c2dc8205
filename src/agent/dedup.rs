use std::collections::HashSet;

use crate::store::types::RetrievalResult;

/// Drop results whose (reference, text) was already seen. Keeps the first
/// occurrence and the original order.
pub fn dedupe(results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert((r.reference.clone(), r.text.clone())))
        .collect()
}

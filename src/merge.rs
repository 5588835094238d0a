//! Field-merge and score-ranking helpers shared by handlers.

use std::cmp::Ordering;

use crate::doc::Metadata;

/// Writes `values` under `field`, replacing existing values when `overwrite`
/// is set and appending after them otherwise.
pub fn merge_values(metadata: &mut Metadata, field: &str, values: Vec<String>, overwrite: bool) {
    if overwrite {
        metadata.set(field, values);
    } else {
        metadata.add(field, values);
    }
}

/// Drops values that are blank once trimmed. Kept values are not trimmed.
pub fn non_blank<I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    values
        .into_iter()
        .filter(|v| !v.trim().is_empty())
        .collect()
}

/// Collapses whitespace runs into single spaces and trims the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sorts scored entries by descending score. The sort is stable, so entries
/// with equal scores keep their incoming (declaration) order.
pub fn rank_by_score<T>(mut scored: Vec<(T, f64)>) -> Vec<(T, f64)> {
    scored.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(Ordering::Equal));
    scored
}

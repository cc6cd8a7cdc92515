//! Cross-chunk merge
//!
//! Overlapping chunks report the same fact more than once, and chunks
//! complete in arbitrary order. The merge keeps one field per identity and
//! produces the same output whatever order its inputs arrive in.

use attest_domain::ExtractedField;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Merge per-chunk field lists into one deduplicated, sorted list
///
/// For each `(field_type, value)` identity the highest confidence wins; ties
/// go to the field whose source and citation sort first. Output is sorted by
/// identity.
pub fn merge_fields<I>(chunk_results: I) -> Vec<ExtractedField>
where
    I: IntoIterator<Item = Vec<ExtractedField>>,
{
    let mut merged: BTreeMap<(String, String), ExtractedField> = BTreeMap::new();

    for field in chunk_results.into_iter().flatten() {
        let identity = field.identity();
        let replace = merged
            .get(&identity)
            .map_or(true, |current| preferred(&field, current));
        if replace {
            merged.insert(identity, field);
        }
    }

    merged.into_values().collect()
}

/// Whether `candidate` should replace `current`
fn preferred(candidate: &ExtractedField, current: &ExtractedField) -> bool {
    match candidate.confidence.value().total_cmp(&current.confidence.value()) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => tie_break(candidate).cmp(&tie_break(current)) == Ordering::Less,
    }
}

fn tie_break(field: &ExtractedField) -> (&str, Option<u32>, Option<&str>, &str, &str, String) {
    (
        field.source.location.as_str(),
        field.source.page,
        field.source.section.as_deref(),
        field.raw_text.as_deref().unwrap_or(""),
        field.reasoning.as_str(),
        field.value.to_string(),
    )
}

//! Citation verification
//!
//! A backend-supplied field carries `raw_text`, the passage it claims to have
//! read. The verifier looks for that passage in the source: first as a
//! case-insensitive substring, then by sliding a window over the source and
//! scoring each window with an order-insensitive token-set similarity. The
//! outcome adjusts the field's confidence.

use crate::{VerifierConfig, VerifierError};
use attest_domain::{ExtractedField, VerificationStatus};
use similar::TextDiff;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Result of looking for a citation in the source
#[derive(Debug, Clone, PartialEq)]
pub struct CitationMatch {
    /// Whether the best score reached the threshold
    pub verified: bool,

    /// Best similarity found, 0-100
    pub score: f64,

    /// Source text that produced the best score
    pub snippet: String,
}

impl CitationMatch {
    fn none() -> Self {
        Self {
            verified: false,
            score: 0.0,
            snippet: String::new(),
        }
    }

    /// As a `(verified, score, snippet)` tuple
    pub fn into_tuple(self) -> (bool, f64, String) {
        (self.verified, self.score, self.snippet)
    }
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    f64::from(TextDiff::from_chars(a, b).ratio()) * 100.0
}

fn join<'a>(parts: impl IntoIterator<Item = &'a String>) -> String {
    parts.into_iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}

fn extend(base: &str, rest: &str) -> String {
    match (base.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{} {}", base, rest),
    }
}

/// Order-insensitive similarity of two texts, 0-100
///
/// Tokens are lower-cased alphanumeric runs. When one token set contains the
/// other the score is 100; otherwise the sorted intersection is compared
/// against each side's full sorted token string and the best ratio wins.
///
/// ```
/// use attest_verifier::token_set_ratio;
///
/// assert_eq!(token_set_ratio("start date 2022", "2022 Start-Date"), 100.0);
/// assert!(token_set_ratio("freehold title", "leasehold lease") < 75.0);
/// ```
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let left = tokens(a);
    let right = tokens(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let common: BTreeSet<&String> = left.intersection(&right).collect();
    let only_left: Vec<&String> = left.difference(&right).collect();
    let only_right: Vec<&String> = right.difference(&left).collect();

    if !common.is_empty() && (only_left.is_empty() || only_right.is_empty()) {
        return 100.0;
    }

    let base = join(common.iter().copied());
    let with_left = extend(&base, &join(only_left));
    let with_right = extend(&base, &join(only_right));

    ratio(&base, &with_left)
        .max(ratio(&base, &with_right))
        .max(ratio(&with_left, &with_right))
}

/// Search `source` for `raw_text`
///
/// `field_type` only labels log output. Returns `(verified, score, snippet)`.
///
/// ```
/// use attest_verifier::verify_citation;
///
/// let source = "Section 2. Project Start Date: 01/01/2022. The project covers 500 ha.";
/// let (ok, score, snippet) =
///     verify_citation("project start date: 01/01/2022", source, "project_start_date", 75.0);
/// assert!(ok);
/// assert_eq!(score, 100.0);
/// assert_eq!(snippet, "project start date: 01/01/2022");
/// ```
pub fn verify_citation(
    raw_text: &str,
    source_content: &str,
    field_type: &str,
    min_similarity: f64,
) -> (bool, f64, String) {
    search(raw_text, source_content, field_type, min_similarity, 1.5).into_tuple()
}

fn search(raw_text: &str, source: &str, field_type: &str, min_similarity: f64, window_factor: f64) -> CitationMatch {
    let needle = raw_text.trim();
    if needle.is_empty() || source.trim().is_empty() {
        return CitationMatch::none();
    }

    if source.to_lowercase().contains(&needle.to_lowercase()) {
        return CitationMatch {
            verified: true,
            score: 100.0,
            snippet: needle.to_string(),
        };
    }

    // Byte offset of every char boundary, so windows are counted in chars
    let bounds: Vec<usize> = source
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(source.len()))
        .collect();
    let source_chars = bounds.len() - 1;
    let needle_chars = needle.chars().count();
    let window = ((needle_chars as f64 * window_factor).ceil() as usize).clamp(1, source_chars);
    let step = (needle_chars / 4).max(1);

    let mut best_score = 0.0;
    let mut best_start = 0;
    let last_start = source_chars - window;
    let mut start = 0;
    loop {
        let candidate = &source[bounds[start]..bounds[start + window]];
        let score = token_set_ratio(needle, candidate);
        if score > best_score {
            best_score = score;
            best_start = start;
        }
        if start == last_start || best_score >= 100.0 {
            break;
        }
        // The final window is aligned to the end of the source
        start = (start + step).min(last_start);
    }

    let snippet = source[bounds[best_start]..bounds[best_start + window]].trim().to_string();
    let verified = best_score >= min_similarity;
    debug!(field_type, score = best_score, verified, "Fuzzy citation search finished");

    CitationMatch {
        verified,
        score: best_score,
        snippet,
    }
}

/// Verifies citations and calibrates confidence
#[derive(Debug, Clone, Default)]
pub struct CitationVerifier {
    config: VerifierConfig,
}

impl CitationVerifier {
    /// Create a verifier
    ///
    /// # Errors
    ///
    /// Returns `VerifierError::Config` if the configuration is invalid.
    pub fn new(config: VerifierConfig) -> Result<Self, VerifierError> {
        config.validate().map_err(VerifierError::Config)?;
        Ok(Self { config })
    }

    /// Active configuration
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Look for `raw_text` in `source`
    pub fn verify(&self, raw_text: &str, source: &str) -> CitationMatch {
        search(raw_text, source, "", self.config.min_similarity, self.config.window_factor)
    }

    /// Verify one field's citation and calibrate its confidence
    ///
    /// - no citation: confidence scaled by `missing_citation_factor`
    /// - citation not found: confidence reduced by `unverified_penalty`
    /// - citation found: confidence unchanged
    pub fn verify_field(&self, mut field: ExtractedField, source: &str) -> ExtractedField {
        let raw_text = field.raw_text.as_deref().map(str::trim).unwrap_or("");
        if raw_text.is_empty() {
            field.verification_status = VerificationStatus::NoCitation;
            field.verification_score = 0.0;
            field.confidence = field.confidence.scale(self.config.missing_citation_factor);
            field.verification_warning = Some("No citation provided".to_string());
            debug!(field_type = %field.field_type, value = %field.value, "Field has no citation");
            return field;
        }

        let found = search(
            raw_text,
            source,
            &field.field_type,
            self.config.min_similarity,
            self.config.window_factor,
        );
        field.verification_score = found.score;

        if found.verified {
            field.verification_status = VerificationStatus::Verified;
            field.verification_warning = None;
        } else {
            field.verification_status = VerificationStatus::Failed;
            field.confidence = field.confidence.penalize(self.config.unverified_penalty);
            let warning = format!(
                "Citation not found in source (best match {:.0}/100, threshold {:.0})",
                found.score, self.config.min_similarity
            );
            warn!(
                field_type = %field.field_type,
                value = %field.value,
                score = found.score,
                "Citation verification failed"
            );
            field.verification_warning = Some(warning);
        }
        field
    }

    /// Verify every field against the same source
    pub fn verify_all(&self, fields: Vec<ExtractedField>, source: &str) -> Vec<ExtractedField> {
        fields.into_iter().map(|f| self.verify_field(f, source)).collect()
    }
}

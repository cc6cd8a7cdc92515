//! Domain false-positive filters
//!
//! Backends reliably produce a few kinds of plausible-looking junk: file
//! name prefixes read as project identifiers, month names read as dates,
//! "N/A" read as a tenure type. Each extractor kind has a filter that drops
//! these before citation verification.

use crate::VerifierError;
use attest_domain::{ExtractedField, ExtractorKind};
use regex::Regex;
use std::fmt;
use tracing::warn;

/// Why a candidate was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRejection {
    /// Value is empty or whitespace
    Empty,

    /// Value is a placeholder such as "n/a"
    Placeholder(String),

    /// Date value contains no digit
    NoDigits,

    /// Short numeral cited from a file name
    FilenameNumeral,

    /// Short numeral cited from a document listing
    ListingNumeral,
}

impl fmt::Display for FilterRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterRejection::Empty => write!(f, "empty value"),
            FilterRejection::Placeholder(p) => write!(f, "placeholder value {:?}", p),
            FilterRejection::NoDigits => write!(f, "date without digits"),
            FilterRejection::FilenameNumeral => write!(f, "numeral taken from a file name"),
            FilterRejection::ListingNumeral => write!(f, "numeral taken from a document listing"),
        }
    }
}

/// Per-kind false-positive filter
pub trait FieldFilter: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Judge a single candidate; `None` keeps it
    fn check(&self, field: &ExtractedField) -> Option<FilterRejection>;

    /// Keep the candidates that pass, in order
    fn filter(&self, fields: Vec<ExtractedField>) -> Vec<ExtractedField> {
        fields
            .into_iter()
            .filter(|field| match self.check(field) {
                None => true,
                Some(reason) => {
                    warn!(
                        filter = self.name(),
                        field_type = %field.field_type,
                        value = %field.value,
                        %reason,
                        "Dropped false-positive candidate"
                    );
                    false
                }
            })
            .collect()
    }
}

fn is_blank(field: &ExtractedField) -> bool {
    field.value.is_blank()
}

fn citation(field: &ExtractedField) -> &str {
    field.raw_text.as_deref().unwrap_or("")
}

/// Registry identifier filter
#[derive(Debug, Clone)]
pub struct ProjectIdFilter {
    registry_patterns: Vec<Regex>,
    identifier_label: Regex,
    filename_marker: Regex,
    listing_marker: Regex,
    max_bare_numeral_len: usize,
}

/// Registry identifier shapes accepted by default
pub const DEFAULT_REGISTRY_PATTERNS: &[&str] = &[
    r"^(?i:VCS|VM|GS|GSF|CAR|ACR|PD|PRJ|CDM)[-_ ]?\d+$",
    r"(?i)^[A-Z]\d{2}-\d{3,}$",
];

impl ProjectIdFilter {
    /// Filter with the default registry patterns
    pub fn new() -> Result<Self, VerifierError> {
        Self::with_patterns(DEFAULT_REGISTRY_PATTERNS)
    }

    /// Filter with custom registry patterns
    pub fn with_patterns(patterns: &[&str]) -> Result<Self, VerifierError> {
        let registry_patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            registry_patterns,
            identifier_label: Regex::new(
                r"(?i)\b(?:project\s+)?(?:id|identifier|registry\s+(?:id|number|no\.?)|project\s+(?:number|no\.?))\s*[:#]",
            )?,
            filename_marker: Regex::new(r"(?i)\.(?:pdf|docx?|xlsx?|csv|txt|json|kml|kmz|shp|zip|png|jpe?g)\b")?,
            listing_marker: Regex::new(
                r"(?i)(?:list\s+of\s+(?:documents|annexes|appendices)|document\s+list|appendix|annex|attachment|exhibit|^\s*\d+[.)]\s)",
            )?,
            max_bare_numeral_len: 6,
        })
    }

    fn is_registry_id(&self, value: &str) -> bool {
        self.registry_patterns.iter().any(|p| p.is_match(value))
    }

    /// Whether an identifier label in the citation introduces this value
    fn is_labelled(&self, value: &str, cited: &str) -> bool {
        self.identifier_label.find_iter(cited).any(|label| {
            let rest = cited[label.end()..].trim_start();
            rest.get(..value.len()).map_or(false, |head| head.eq_ignore_ascii_case(value))
                && !rest[value.len()..].starts_with(|c: char| c.is_alphanumeric())
        })
    }

    fn is_bare_numeral(&self, value: &str) -> bool {
        !value.is_empty() && value.len() <= self.max_bare_numeral_len && value.chars().all(|c| c.is_ascii_digit())
    }
}

impl FieldFilter for ProjectIdFilter {
    fn name(&self) -> &'static str {
        "project_id"
    }

    fn check(&self, field: &ExtractedField) -> Option<FilterRejection> {
        if is_blank(field) {
            return Some(FilterRejection::Empty);
        }
        let value = field.value.to_string();
        let value = value.trim();
        let cited = citation(field);

        if self.is_registry_id(value) || self.is_labelled(value, cited) {
            return None;
        }
        if self.is_bare_numeral(value) {
            if self.filename_marker.is_match(cited) {
                return Some(FilterRejection::FilenameNumeral);
            }
            if self.listing_marker.is_match(cited) {
                return Some(FilterRejection::ListingNumeral);
            }
        }
        None
    }
}

/// Date filter: drops values that cannot be a date
#[derive(Debug, Clone, Copy, Default)]
pub struct DateFilter;

impl FieldFilter for DateFilter {
    fn name(&self) -> &'static str {
        "dates"
    }

    fn check(&self, field: &ExtractedField) -> Option<FilterRejection> {
        if is_blank(field) {
            return Some(FilterRejection::Empty);
        }
        if !field.value.to_string().chars().any(|c| c.is_ascii_digit()) {
            return Some(FilterRejection::NoDigits);
        }
        None
    }
}

const TENURE_PLACEHOLDERS: &[&str] = &[
    "n/a",
    "na",
    "none",
    "null",
    "unknown",
    "not specified",
    "not stated",
    "not available",
    "tbd",
    "-",
];

/// Land tenure filter: drops placeholder answers
#[derive(Debug, Clone, Copy, Default)]
pub struct LandTenureFilter;

impl FieldFilter for LandTenureFilter {
    fn name(&self) -> &'static str {
        "land_tenure"
    }

    fn check(&self, field: &ExtractedField) -> Option<FilterRejection> {
        if is_blank(field) {
            return Some(FilterRejection::Empty);
        }
        let normalized = field.value.dedup_key();
        let normalized = normalized.trim_end_matches('.');
        if TENURE_PLACEHOLDERS.contains(&normalized) {
            return Some(FilterRejection::Placeholder(normalized.to_string()));
        }
        None
    }
}

/// Default filter for an extractor kind
pub fn filter_for(kind: ExtractorKind) -> Result<Box<dyn FieldFilter>, VerifierError> {
    Ok(match kind {
        ExtractorKind::Dates => Box::new(DateFilter),
        ExtractorKind::LandTenure => Box::new(LandTenureFilter),
        ExtractorKind::ProjectId => Box::new(ProjectIdFilter::new()?),
    })
}

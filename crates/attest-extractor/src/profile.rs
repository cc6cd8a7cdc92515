//! Per-kind extraction profiles
//!
//! A profile is everything that differs between extractor kinds: the
//! instructions the backend sees, the response schema, the field types it
//! should use, and the false-positive filter applied before verification.

use crate::error::ExtractorError;
use attest_domain::ExtractorKind;
use attest_verifier::{filter_for, FieldFilter};
use serde_json::json;
use std::fmt;

const DATE_INSTRUCTIONS: &str = r#"Extract every date that defines the project timeline.

Look for project start dates, crediting period start and end dates, monitoring
period boundaries, and registration, validation or verification dates.
Report each date exactly as written in the text; do not reformat or infer it.
Skip dates that only describe when the document itself was printed or edited."#;

const LAND_TENURE_INSTRUCTIONS: &str = r#"Extract facts about land tenure: who holds the land and under what right.

Look for the tenure type (freehold, leasehold, customary, concession, public),
the landowner or rights holder, lease terms and durations, the land area under
the project, and the documents that evidence tenure.
Do not answer with placeholders; if the text does not say, return nothing."#;

const PROJECT_ID_INSTRUCTIONS: &str = r#"Extract the identifiers under which this project is registered.

Look for registry identifiers (for example "VCS-1234", "GS 5678" or "C06-006")
and explicitly labelled project numbers.
Numbers that only appear inside file names, page headers or lists of
attachments are not project identifiers."#;

const DATE_FIELD_TYPES: &[&str] = &[
    "project_start_date",
    "crediting_period_start",
    "crediting_period_end",
    "monitoring_period_start",
    "monitoring_period_end",
    "registration_date",
    "validation_date",
    "verification_date",
];

const LAND_TENURE_FIELD_TYPES: &[&str] = &[
    "tenure_type",
    "landowner",
    "lease_term",
    "land_area",
    "tenure_document",
];

const PROJECT_ID_FIELD_TYPES: &[&str] = &["project_id", "registry_id"];

/// Prompt, schema and filter for one extractor kind
pub struct FieldProfile {
    kind: ExtractorKind,
    instructions: &'static str,
    field_types: &'static [&'static str],
    schema: String,
    filter: Box<dyn FieldFilter>,
}

impl FieldProfile {
    /// Profile for an extractor kind
    pub fn for_kind(kind: ExtractorKind) -> Result<Self, ExtractorError> {
        let (instructions, field_types) = match kind {
            ExtractorKind::Dates => (DATE_INSTRUCTIONS, DATE_FIELD_TYPES),
            ExtractorKind::LandTenure => (LAND_TENURE_INSTRUCTIONS, LAND_TENURE_FIELD_TYPES),
            ExtractorKind::ProjectId => (PROJECT_ID_INSTRUCTIONS, PROJECT_ID_FIELD_TYPES),
        };
        Ok(Self {
            kind,
            instructions,
            field_types,
            schema: response_schema(),
            filter: filter_for(kind)?,
        })
    }

    /// Project timeline dates
    pub fn dates() -> Result<Self, ExtractorError> {
        Self::for_kind(ExtractorKind::Dates)
    }

    /// Land tenure facts
    pub fn land_tenure() -> Result<Self, ExtractorError> {
        Self::for_kind(ExtractorKind::LandTenure)
    }

    /// Registry identifiers
    pub fn project_ids() -> Result<Self, ExtractorError> {
        Self::for_kind(ExtractorKind::ProjectId)
    }

    /// Replace the false-positive filter
    pub fn with_filter(mut self, filter: Box<dyn FieldFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Extractor kind
    pub fn kind(&self) -> ExtractorKind {
        self.kind
    }

    /// Kind-specific prompt instructions
    pub fn instructions(&self) -> &str {
        self.instructions
    }

    /// Suggested field types
    pub fn field_types(&self) -> &[&'static str] {
        self.field_types
    }

    /// JSON schema for the response
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// False-positive filter
    pub fn filter(&self) -> &dyn FieldFilter {
        self.filter.as_ref()
    }
}

impl fmt::Debug for FieldProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldProfile")
            .field("kind", &self.kind)
            .field("field_types", &self.field_types)
            .field("filter", &self.filter.name())
            .finish()
    }
}

fn response_schema() -> String {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "value": { "type": ["string", "number", "boolean"] },
                "field_type": { "type": "string" },
                "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                "source": { "type": "string" },
                "raw_text": { "type": "string" },
                "reasoning": { "type": "string" },
                "page": { "type": "integer" },
                "section": { "type": "string" }
            },
            "required": ["value", "field_type", "confidence", "source", "raw_text"]
        }
    })
    .to_string()
}

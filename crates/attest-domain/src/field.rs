//! Extracted fields - the unit of output of the pipeline
//!
//! A field is a claim made by the generative backend. It is not trusted until
//! its citation has been checked against the source document, and its
//! confidence reflects the outcome of that check.

use crate::{Confidence, SourceRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar value of an extracted field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean value
    Bool(bool),
    /// Numeric value
    Number(f64),
    /// Text value
    Text(String),
}

impl FieldValue {
    /// Build a value from a JSON scalar
    ///
    /// Returns `None` for null, arrays and objects.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(FieldValue::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(FieldValue::Number),
            serde_json::Value::String(s) => Some(FieldValue::Text(s.clone())),
            _ => None,
        }
    }

    /// Whether the value is empty or whitespace-only text
    pub fn is_blank(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.trim().is_empty())
    }

    /// Text view of the value, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Normalized form used to decide whether two values are the same fact
    pub fn dedup_key(&self) -> String {
        self.to_string().trim().to_lowercase()
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

/// Outcome of checking a field's citation against the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Not yet checked
    #[default]
    Unverified,
    /// Citation found in the source (exactly or above the similarity threshold)
    Verified,
    /// Citation present but not found in the source
    Failed,
    /// The backend supplied no citation
    NoCitation,
}

impl VerificationStatus {
    /// Get the status name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Failed => "failed",
            VerificationStatus::NoCitation => "no_citation",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fact extracted from a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    /// Extracted value
    pub value: FieldValue,

    /// Field type tag (e.g., "project_start_date", "project_id")
    pub field_type: String,

    /// Document and location the value was taken from
    pub source: SourceRef,

    /// Trust score in [0, 1]
    pub confidence: Confidence,

    /// Backend's explanation for the value
    #[serde(default)]
    pub reasoning: String,

    /// Verbatim excerpt the backend claims supports the value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,

    /// Citation verification outcome
    #[serde(default)]
    pub verification_status: VerificationStatus,

    /// Best similarity score found during verification, 0-100
    #[serde(default)]
    pub verification_score: f64,

    /// Human-readable explanation when verification did not succeed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_warning: Option<String>,
}

impl ExtractedField {
    /// Create a new, unverified field
    pub fn new(
        value: impl Into<FieldValue>,
        field_type: impl Into<String>,
        source: SourceRef,
        confidence: impl Into<Confidence>,
    ) -> Self {
        Self {
            value: value.into(),
            field_type: field_type.into(),
            source,
            confidence: confidence.into(),
            reasoning: String::new(),
            raw_text: None,
            verification_status: VerificationStatus::Unverified,
            verification_score: 0.0,
            verification_warning: None,
        }
    }

    /// Attach the claimed verbatim citation
    pub fn with_raw_text(mut self, raw_text: impl Into<String>) -> Self {
        self.raw_text = Some(raw_text.into());
        self
    }

    /// Attach the backend's reasoning
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// Identity used for deduplication: (field type, normalized value)
    pub fn identity(&self) -> (String, String) {
        (self.field_type.trim().to_lowercase(), self.value.dedup_key())
    }

    /// Whether the field passed citation verification
    pub fn is_verified(&self) -> bool {
        self.verification_status == VerificationStatus::Verified
    }
}

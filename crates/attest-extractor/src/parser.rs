//! Response validation: turn backend output into well-formed fields
//!
//! Backends wrap JSON in markdown fences, prepend chatter, and occasionally
//! emit entries missing required keys. Nothing leaves this module unless it
//! has a scalar value, a field type, a numeric confidence and a source.

use attest_domain::{Confidence, ExtractedField, FieldValue, SourceRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

/// What to do with a malformed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPolicy {
    /// Drop the entry and keep the rest of the response
    #[default]
    DropInvalid,

    /// Reject the whole response
    RejectBatch,
}

/// Errors from response validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// No JSON array could be located in the response
    #[error("No JSON array found in response")]
    NoJsonArray,

    /// A JSON array was located but could not be parsed
    #[error("Malformed JSON: {0}")]
    Malformed(String),

    /// An entry was malformed under the reject-batch policy
    #[error("Entry {index} rejected: {reason}")]
    BatchRejected {
        /// Position of the entry in the array
        index: usize,
        /// What was wrong with it
        reason: String,
    },
}

/// Validator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Malformed entry handling
    pub entry_policy: EntryPolicy,

    /// Clamp out-of-range confidences into [0, 1]; otherwise such entries are malformed
    pub clamp_confidence: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            entry_policy: EntryPolicy::DropInvalid,
            clamp_confidence: true,
        }
    }
}

impl ValidatorConfig {
    /// Reject whole responses on any malformed entry
    pub fn strict() -> Self {
        Self {
            entry_policy: EntryPolicy::RejectBatch,
            clamp_confidence: false,
        }
    }
}

/// A dropped entry and why
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedEntry {
    /// Position of the entry in the array
    pub index: usize,
    /// What was wrong with it
    pub reason: String,
}

/// Result of validating one response
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Well-formed, deduplicated fields in first-seen order
    pub fields: Vec<ExtractedField>,
    /// Entries dropped under the drop-invalid policy
    pub rejected: Vec<RejectedEntry>,
}

/// Validates raw backend responses
#[derive(Debug, Clone, Default)]
pub struct ResponseValidator {
    config: ValidatorConfig,
}

impl ResponseValidator {
    /// Create a validator
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validator configuration
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate a raw response, attributing fields to `document`
    pub fn validate(&self, response: &str, document: &str) -> Result<ValidationReport, ValidationError> {
        let entries = extract_json_array(response)?;
        let mut report = ValidationReport::default();
        let mut seen: HashMap<(String, String), usize> = HashMap::new();

        for (index, entry) in entries.iter().enumerate() {
            let field = match self.parse_entry(entry, document) {
                Ok(field) => field,
                Err(reason) => {
                    if self.config.entry_policy == EntryPolicy::RejectBatch {
                        return Err(ValidationError::BatchRejected { index, reason });
                    }
                    warn!(index, %reason, "Dropping malformed entry");
                    report.rejected.push(RejectedEntry { index, reason });
                    continue;
                }
            };

            match seen.get(&field.identity()) {
                Some(&pos) => {
                    if field.confidence.value() > report.fields[pos].confidence.value() {
                        report.fields[pos] = field;
                    }
                }
                None => {
                    seen.insert(field.identity(), report.fields.len());
                    report.fields.push(field);
                }
            }
        }

        debug!(
            fields = report.fields.len(),
            rejected = report.rejected.len(),
            "Validated response"
        );
        Ok(report)
    }

    fn parse_entry(&self, entry: &Value, document: &str) -> Result<ExtractedField, String> {
        let obj = entry.as_object().ok_or_else(|| "entry is not a JSON object".to_string())?;

        let value = obj
            .get("value")
            .and_then(FieldValue::from_json)
            .ok_or_else(|| "missing or non-scalar 'value'".to_string())?;

        let field_type = obj
            .get("field_type")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "missing or empty 'field_type'".to_string())?;

        let raw_confidence = obj
            .get("confidence")
            .and_then(Value::as_f64)
            .ok_or_else(|| "missing or non-numeric 'confidence'".to_string())?;
        let confidence = if self.config.clamp_confidence {
            Confidence::new(raw_confidence)
        } else {
            Confidence::checked(raw_confidence)
                .ok_or_else(|| format!("confidence {} out of range", raw_confidence))?
        };

        let location = obj
            .get("source")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing or non-string 'source'".to_string())?;

        let mut source = SourceRef::new(document, location);
        if let Some(page) = optional_page(obj) {
            source = source.with_page(page);
        }
        if let Some(section) = optional_str(obj, "section") {
            source = source.with_section(section);
        }

        let mut field = ExtractedField::new(value, field_type, source, confidence);
        if let Some(raw_text) = optional_str(obj, "raw_text") {
            field = field.with_raw_text(raw_text);
        }
        if let Some(reasoning) = optional_str(obj, "reasoning") {
            field = field.with_reasoning(reasoning);
        }
        Ok(field)
    }
}

fn optional_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

fn optional_page(obj: &Map<String, Value>) -> Option<u32> {
    match obj.get("page")? {
        Value::Number(n) => n.as_u64().and_then(|p| u32::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Locate and parse the JSON array in a backend response
///
/// Accepts a bare array, an array inside a markdown code fence, or an array
/// surrounded by prose. When prose holds several bracketed values the first
/// array of objects wins, then the first array of anything.
pub fn extract_json_array(response: &str) -> Result<Vec<Value>, ValidationError> {
    let body = strip_code_fence(response.trim());

    if let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(body) {
        return Ok(entries);
    }

    let mut first_error = None;
    let mut fallback = None;
    for (i, _) in body.match_indices('[') {
        match serde_json::Deserializer::from_str(&body[i..]).into_iter::<Value>().next() {
            Some(Ok(Value::Array(entries))) => {
                if entries.iter().all(Value::is_object) {
                    return Ok(entries);
                }
                fallback.get_or_insert(entries);
            }
            Some(Err(e)) => {
                first_error.get_or_insert(e);
            }
            _ => {}
        }
    }

    match (fallback, first_error) {
        (Some(entries), _) => Ok(entries),
        (None, Some(e)) => Err(ValidationError::Malformed(e.to_string())),
        (None, None) => Err(ValidationError::NoJsonArray),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after = &text[open + 3..];
    let inner = match after.find("```") {
        Some(close) => &after[..close],
        None => after,
    };
    // Drop the info string (e.g. "json"), which may share the line with the body
    let inner = inner.trim_start();
    let info_len = inner.find(|c: char| !c.is_ascii_alphanumeric()).unwrap_or(inner.len());
    inner[info_len..].trim()
}

//! Request and outcome types for extraction

use attest_domain::{ExtractedField, ExtractorKind};
use attest_llm::BackendErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Optional guidance passed through to the prompt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionHints {
    /// Field types the caller expects to find
    pub expected_fields: Vec<String>,

    /// Free-form notes about the document
    pub notes: Option<String>,
}

impl ExtractionHints {
    /// Whether there is anything to pass on
    pub fn is_empty(&self) -> bool {
        self.expected_fields.is_empty() && self.notes.as_deref().map_or(true, |n| n.trim().is_empty())
    }
}

/// Request to extract fields from one document
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Full document text
    pub content: String,

    /// Name the document is cited by
    pub document_name: String,

    /// Prompt hints
    pub hints: ExtractionHints,
}

impl ExtractionRequest {
    /// Create a request without hints
    pub fn new(content: impl Into<String>, document_name: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            document_name: document_name.into(),
            hints: ExtractionHints::default(),
        }
    }

    /// Attach hints
    pub fn with_hints(mut self, hints: ExtractionHints) -> Self {
        self.hints = hints;
        self
    }
}

/// Furthest pipeline stage a run reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStage {
    /// Nothing done yet
    Pending,
    /// Document split into chunks
    Chunked,
    /// Backend called for every chunk
    ModelInvoked,
    /// Responses validated
    Validated,
    /// Per-chunk results merged
    Merged,
    /// False positives filtered
    Filtered,
    /// Citations verified
    Verified,
    /// Finished
    Done,
}

impl ExtractionStage {
    /// Stage name
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStage::Pending => "pending",
            ExtractionStage::Chunked => "chunked",
            ExtractionStage::ModelInvoked => "model_invoked",
            ExtractionStage::Validated => "validated",
            ExtractionStage::Merged => "merged",
            ExtractionStage::Filtered => "filtered",
            ExtractionStage::Verified => "verified",
            ExtractionStage::Done => "done",
        }
    }
}

impl fmt::Display for ExtractionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chunk that produced no fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkFailure {
    /// Position of the chunk in the document
    pub chunk_index: usize,

    /// Byte offset where the chunk starts
    pub start_offset: usize,

    /// Byte offset where the chunk ends
    pub end_offset: usize,

    /// Backend error kind, if the backend failed (None for invalid responses)
    pub backend_kind: Option<BackendErrorKind>,

    /// Human-readable reason
    pub reason: String,
}

/// Result of one extraction run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    /// Extractor that produced the fields
    pub kind: ExtractorKind,

    /// Document the fields were extracted from
    pub document_name: String,

    /// Verified, filtered, deduplicated fields
    pub fields: Vec<ExtractedField>,

    /// Chunks that failed without aborting the run
    pub chunk_failures: Vec<ChunkFailure>,

    /// Whether the fields came from the extraction cache
    pub cached: bool,

    /// Furthest stage reached
    pub stage: ExtractionStage,

    /// Chunks sent to the backend
    pub chunks_processed: usize,

    /// Model that produced (or originally produced) the fields
    pub model: String,

    /// Wall-clock time for the run
    pub duration: Duration,
}

impl ExtractionOutcome {
    /// Whether every chunk succeeded
    pub fn is_complete(&self) -> bool {
        self.chunk_failures.is_empty()
    }

    /// Number of fields that passed citation verification
    pub fn verified_count(&self) -> usize {
        self.fields.iter().filter(|f| f.is_verified()).count()
    }
}

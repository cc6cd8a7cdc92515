//! Attest Extractor
//!
//! Pulls structured, citation-verified fields out of long documents.
//!
//! # Overview
//!
//! A generative backend is asked for fields together with the verbatim text
//! each one was read from. Nothing it says is trusted: responses are
//! validated entry by entry, chunk results are merged, known false-positive
//! shapes are filtered out, and every remaining citation is checked against
//! the source document before a field is returned.
//!
//! # Architecture
//!
//! ```text
//! Document → Chunker → LLM (per chunk, concurrent) → ResponseValidator
//!          → merge → FieldFilter → CitationVerifier → cache / session
//! ```
//!
//! # Example Usage
//!
//! ```
//! use attest_extractor::{ExtractionRequest, Extractor, ExtractorConfig, FieldExtractor};
//! use attest_llm::MockProvider;
//! use attest_store::{CostLedger, MemoryCache};
//!
//! # tokio_test::block_on(async {
//! let llm = MockProvider::new(r#"[{
//!     "value": "01/01/2022",
//!     "field_type": "project_start_date",
//!     "confidence": 0.9,
//!     "source": "section 1",
//!     "raw_text": "Project Start Date: 01/01/2022"
//! }]"#);
//! let extractor = Extractor::dates(llm, MemoryCache::new(), ExtractorConfig::default()).unwrap();
//! let costs = CostLedger::in_memory("session-1");
//!
//! let request = ExtractionRequest::new("1. Overview\nProject Start Date: 01/01/2022\n", "plan.pdf");
//! let outcome = extractor.extract(&request, &costs).await.unwrap();
//!
//! assert_eq!(outcome.fields.len(), 1);
//! assert!(outcome.fields[0].is_verified());
//! # });
//! ```

#![warn(missing_docs)]

mod chunking;
mod config;
mod error;
mod extractor;
mod merge;
mod parser;
mod profile;
mod prompt;
mod types;

#[cfg(test)]
mod tests;

pub use chunking::{chunk_text, Chunker};
pub use config::ExtractorConfig;
pub use error::ExtractorError;
pub use extractor::{persist_outcome, Extractor, FieldExtractor};
pub use merge::merge_fields;
pub use parser::{
    extract_json_array, EntryPolicy, RejectedEntry, ResponseValidator, ValidationError, ValidationReport,
    ValidatorConfig,
};
pub use profile::FieldProfile;
pub use prompt::PromptBuilder;
pub use types::{ChunkFailure, ExtractionHints, ExtractionOutcome, ExtractionRequest, ExtractionStage};

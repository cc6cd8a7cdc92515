//! Error types for the Extractor

use crate::parser::ValidationError;
use crate::types::ChunkFailure;
use attest_llm::BackendError;
use attest_store::StoreError;
use attest_verifier::VerifierError;
use thiserror::Error;

/// Errors that can occur during extraction
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fatal backend error (or a backend error outside chunk processing)
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Backend response failed validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Every chunk of the document failed
    #[error("All {} chunks failed", failures.len())]
    AllChunksFailed {
        /// One entry per chunk
        failures: Vec<ChunkFailure>,
    },

    /// Text exceeds maximum length
    #[error("Text too long: {0} chars (max: {1})")]
    TextTooLong(usize, usize),

    /// Extraction cache error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Cost sink error
    #[error("Cost tracking error: {0}")]
    Cost(String),

    /// Background task panicked or was cancelled
    #[error("Task error: {0}")]
    Task(String),

    /// Session store error
    #[error("Store error: {0}")]
    Store(String),
}

impl From<StoreError> for ExtractorError {
    fn from(e: StoreError) -> Self {
        ExtractorError::Store(e.to_string())
    }
}

impl From<VerifierError> for ExtractorError {
    fn from(e: VerifierError) -> Self {
        ExtractorError::Config(e.to_string())
    }
}

impl ExtractorError {
    /// Whether this error came from a fatal backend failure
    pub fn is_fatal_backend(&self) -> bool {
        matches!(self, ExtractorError::Backend(e) if e.is_fatal())
    }
}

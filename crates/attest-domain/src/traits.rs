//! Trait definitions for side-effecting sinks
//!
//! These traits define the boundaries between the extraction pipeline and
//! infrastructure. Implementations live in `attest-store`.

use crate::{ApiCall, CostSummary, ExtractedField, ExtractorKind};
use std::fmt;

/// Receives a record of every backend call and cache hit
///
/// Passed explicitly into every extraction call, so two extractions never
/// share a tracker unless the caller hands them the same one.
pub trait CostSink {
    /// Error type for sink operations
    type Error;

    /// Record a call, returning the cost attributed to it
    fn record(&self, call: ApiCall) -> Result<f64, Self::Error>;

    /// Aggregate everything recorded so far
    fn summary(&self) -> Result<CostSummary, Self::Error>;
}

/// Identity of a cached extraction: (document, extractor kind)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    /// Content fingerprint of the document (hex digest)
    pub document_hash: String,

    /// Extractor the entry belongs to
    pub kind: ExtractorKind,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(document_hash: impl Into<String>, kind: ExtractorKind) -> Self {
        Self {
            document_hash: document_hash.into(),
            kind,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.document_hash)
    }
}

/// Content-keyed store of finished extractions
pub trait FieldCache {
    /// Error type for cache operations
    type Error;

    /// Look up a cached field list
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<ExtractedField>>, Self::Error>;

    /// Store a field list, replacing any previous entry
    fn set(&self, key: &CacheKey, fields: &[ExtractedField]) -> Result<(), Self::Error>;

    /// Remove one entry, returning whether it existed
    fn invalidate(&self, key: &CacheKey) -> Result<bool, Self::Error>;

    /// Remove every entry, returning how many were removed
    fn clear(&self) -> Result<usize, Self::Error>;
}

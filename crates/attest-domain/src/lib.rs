//! Attest Domain Layer
//!
//! This crate contains the data model shared by every stage of the verified
//! extraction pipeline, plus the trait seams that infrastructure crates
//! implement. It holds no I/O of its own.
//!
//! ## Key Concepts
//!
//! - **ExtractedField**: A fact asserted by the backend, with its claimed citation
//! - **Confidence**: A trust score in [0, 1], calibrated by citation verification
//! - **Chunk**: A bounded, possibly overlapping slice of a long document
//! - **ApiCall / CostSummary**: Per-call spend records and their derived aggregate
//! - **ExtractorKind**: The family of fields an extractor is responsible for
//!
//! ## Architecture
//!
//! - Pure data types and serde wire formats only
//! - Storage, backend and verification implementations live in other crates
//! - Trait definitions (`CostSink`, `FieldCache`) for the side-effecting sinks

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod confidence;
pub mod cost;
pub mod field;
pub mod kind;
pub mod source;
pub mod traits;

// Re-exports for convenience
pub use chunk::Chunk;
pub use confidence::Confidence;
pub use cost::{ApiCall, CostSummary, ModelPricing, PricingTable};
pub use field::{ExtractedField, FieldValue, VerificationStatus};
pub use kind::ExtractorKind;
pub use source::SourceRef;
pub use traits::{CacheKey, CostSink, FieldCache};

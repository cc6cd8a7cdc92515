//! Attest Verifier
//!
//! The last line of defence against fabricated facts. Every field the
//! backend returns claims a verbatim citation; this crate checks that claim
//! against the source text and calibrates the field's confidence.
//!
//! The verifier provides:
//! - Citation search (exact, then fuzzy token-set matching over a sliding window)
//! - Confidence calibration for verified, unverified and uncited fields
//! - Per-kind filters for known false-positive patterns
//!
//! # Examples
//!
//! ```
//! use attest_domain::{ExtractedField, SourceRef, VerificationStatus};
//! use attest_verifier::{CitationVerifier, VerifierConfig};
//!
//! let verifier = CitationVerifier::new(VerifierConfig::default()).unwrap();
//! let source = "Project Start Date: 01/01/2022";
//! let field = ExtractedField::new("01/01/2022", "project_start_date", SourceRef::new("plan.pdf", "p1"), 0.9)
//!     .with_raw_text("Project Start Date: 01/01/2022");
//!
//! let checked = verifier.verify_field(field, source);
//! assert_eq!(checked.verification_status, VerificationStatus::Verified);
//! ```

#![warn(missing_docs)]

mod citation;
mod config;
mod error;
mod filter;

pub use citation::{token_set_ratio, verify_citation, CitationMatch, CitationVerifier};
pub use config::VerifierConfig;
pub use error::VerifierError;
pub use filter::{
    filter_for, DateFilter, FieldFilter, FilterRejection, LandTenureFilter, ProjectIdFilter,
    DEFAULT_REGISTRY_PATTERNS,
};

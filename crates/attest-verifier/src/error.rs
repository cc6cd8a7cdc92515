//! Verifier error types

use thiserror::Error;

/// Errors that can occur while setting up verification
#[derive(Error, Debug)]
pub enum VerifierError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A filter pattern failed to compile
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

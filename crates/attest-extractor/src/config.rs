//! Configuration for the Extractor

use crate::parser::ValidatorConfig;
use attest_llm::RetryPolicy;
use attest_verifier::VerifierConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the Extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Target chunk size (characters)
    pub chunk_size: usize,

    /// Characters shared between neighbouring chunks
    pub chunk_overlap: usize,

    /// Documents up to this many characters are sent whole
    pub max_input_chars: usize,

    /// Documents above this many characters are refused
    pub max_document_chars: usize,

    /// Chunks in flight at once
    pub max_concurrent_chunks: usize,

    /// Timeout for a single backend call (milliseconds)
    pub call_timeout_ms: u64,

    /// Output token limit per call
    pub max_tokens: u32,

    /// Retry policy for transient backend failures
    pub retry: RetryPolicy,

    /// Response validation settings
    pub validator: ValidatorConfig,

    /// Citation verification settings
    pub verifier: VerifierConfig,
}

impl ExtractorConfig {
    /// Get the per-call timeout as a Duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than 0".to_string());
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err("chunk_overlap must be smaller than chunk_size".to_string());
        }
        if self.max_document_chars == 0 {
            return Err("max_document_chars must be greater than 0".to_string());
        }
        if self.max_input_chars > self.max_document_chars {
            return Err("max_input_chars cannot exceed max_document_chars".to_string());
        }
        if self.max_concurrent_chunks == 0 {
            return Err("max_concurrent_chunks must be greater than 0".to_string());
        }
        if self.call_timeout_ms == 0 {
            return Err("call_timeout_ms must be greater than 0".to_string());
        }
        if self.max_tokens == 0 {
            return Err("max_tokens must be greater than 0".to_string());
        }
        self.retry.validate()?;
        self.verifier.validate()?;
        Ok(())
    }
}

impl Default for ExtractorConfig {
    /// Default configuration with balanced settings
    fn default() -> Self {
        Self {
            chunk_size: 8_000,
            chunk_overlap: 400,
            max_input_chars: 12_000,
            max_document_chars: 2_000_000,
            max_concurrent_chunks: 4,
            call_timeout_ms: 120_000,
            max_tokens: 4_096,
            retry: RetryPolicy::default(),
            validator: ValidatorConfig::default(),
            verifier: VerifierConfig::default(),
        }
    }
}

impl ExtractorConfig {
    /// Aggressive preset: smaller chunks, more parallelism, fail fast
    pub fn aggressive() -> Self {
        Self {
            chunk_size: 4_000,
            chunk_overlap: 200,
            max_input_chars: 6_000,
            max_document_chars: 500_000,
            max_concurrent_chunks: 8,
            call_timeout_ms: 60_000,
            max_tokens: 2_048,
            retry: RetryPolicy {
                max_attempts: 2,
                ..RetryPolicy::default()
            },
            validator: ValidatorConfig::strict(),
            verifier: VerifierConfig::strict(),
        }
    }

    /// Lenient preset: larger chunks, patient retries, forgiving validation
    pub fn lenient() -> Self {
        Self {
            chunk_size: 16_000,
            chunk_overlap: 800,
            max_input_chars: 24_000,
            max_document_chars: 5_000_000,
            max_concurrent_chunks: 2,
            call_timeout_ms: 300_000,
            max_tokens: 8_192,
            retry: RetryPolicy {
                max_attempts: 5,
                ..RetryPolicy::default()
            },
            validator: ValidatorConfig::default(),
            verifier: VerifierConfig::lenient(),
        }
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::EntryPolicy;

    #[test]
    fn test_default_config_is_valid() {
        let config = ExtractorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.call_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(ExtractorConfig::aggressive().validate().is_ok());
        assert!(ExtractorConfig::lenient().validate().is_ok());
    }

    #[test]
    fn test_aggressive_preset() {
        let config = ExtractorConfig::aggressive();
        let default = ExtractorConfig::default();
        assert!(config.chunk_size < default.chunk_size);
        assert!(config.max_concurrent_chunks > default.max_concurrent_chunks);
        assert_eq!(config.validator.entry_policy, EntryPolicy::RejectBatch);
    }

    #[test]
    fn test_lenient_preset() {
        let config = ExtractorConfig::lenient();
        assert!(config.chunk_size > ExtractorConfig::default().chunk_size);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = ExtractorConfig {
            chunk_overlap: 8_000,
            ..ExtractorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ExtractorConfig {
            max_concurrent_chunks: 0,
            ..ExtractorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ExtractorConfig {
            call_timeout_ms: 0,
            ..ExtractorConfig::default()
        };
        assert!(config.validate().is_err());

        let mut config = ExtractorConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ExtractorConfig::aggressive();
        let toml_str = config.to_toml().unwrap();
        let parsed = ExtractorConfig::from_toml(&toml_str).unwrap();

        assert_eq!(parsed.chunk_size, config.chunk_size);
        assert_eq!(parsed.retry, config.retry);
        assert_eq!(parsed.validator, config.validator);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed = ExtractorConfig::from_toml("chunk_size = 2000\nchunk_overlap = 100\n").unwrap();
        assert_eq!(parsed.chunk_size, 2_000);
        assert_eq!(parsed.max_concurrent_chunks, 4);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_invalid_toml() {
        let err = ExtractorConfig::from_toml("chunk_size = \"big\"").unwrap_err();
        assert!(err.starts_with("Failed to parse TOML"));
    }
}

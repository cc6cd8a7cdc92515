//! Verifier configuration

use serde::{Deserialize, Serialize};

/// Thresholds for citation verification and confidence calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Minimum token-set similarity (0-100) for a citation to count as found
    pub min_similarity: f64,

    /// Subtracted from confidence when a citation is not found
    pub unverified_penalty: f64,

    /// Multiplied into confidence when no citation was given
    pub missing_citation_factor: f64,

    /// Window length as a multiple of the citation length
    pub window_factor: f64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            min_similarity: 75.0,
            unverified_penalty: 0.3,
            missing_citation_factor: 0.5,
            window_factor: 1.5,
        }
    }
}

impl VerifierConfig {
    /// Strict preset: near-verbatim citations only, heavy penalties
    pub fn strict() -> Self {
        Self {
            min_similarity: 90.0,
            unverified_penalty: 0.5,
            missing_citation_factor: 0.25,
            window_factor: 1.5,
        }
    }

    /// Lenient preset: tolerates paraphrased citations
    pub fn lenient() -> Self {
        Self {
            min_similarity: 60.0,
            unverified_penalty: 0.15,
            missing_citation_factor: 0.75,
            window_factor: 2.0,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=100.0).contains(&self.min_similarity) {
            return Err("min_similarity must be within 0-100".to_string());
        }
        if !(0.0..=1.0).contains(&self.unverified_penalty) {
            return Err("unverified_penalty must be within 0-1".to_string());
        }
        if !(0.0..=1.0).contains(&self.missing_citation_factor) {
            return Err("missing_citation_factor must be within 0-1".to_string());
        }
        if self.window_factor < 1.0 {
            return Err("window_factor must be at least 1.0".to_string());
        }
        Ok(())
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

    #[test]
    fn test_presets_are_valid() {
        assert!(VerifierConfig::default().validate().is_ok());
        assert!(VerifierConfig::strict().validate().is_ok());
        assert!(VerifierConfig::lenient().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_threshold() {
        let config = VerifierConfig {
            min_similarity: 120.0,
            ..VerifierConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = VerifierConfig::from_toml("min_similarity = 80.0").unwrap();
        assert_eq!(config.min_similarity, 80.0);
        assert_eq!(config.unverified_penalty, 0.3);

        let round = VerifierConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(round, config);
    }
}

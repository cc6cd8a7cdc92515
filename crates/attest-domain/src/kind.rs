//! Extractor kinds

use serde::{Deserialize, Serialize};
use std::fmt;

/// The family of fields an extractor is responsible for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// Key project dates (start date, crediting period, monitoring dates)
    Dates,

    /// Land-tenure attributes (owner, tenure type, area)
    LandTenure,

    /// Registry identifiers (e.g. "C06-006", "VCS-1234")
    ProjectId,
}

impl ExtractorKind {
    /// All kinds, in a stable order
    pub const ALL: [ExtractorKind; 3] = [
        ExtractorKind::Dates,
        ExtractorKind::LandTenure,
        ExtractorKind::ProjectId,
    ];

    /// Get the kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractorKind::Dates => "dates",
            ExtractorKind::LandTenure => "land_tenure",
            ExtractorKind::ProjectId => "project_id",
        }
    }

    /// Parse a kind from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "dates" | "date" => Some(ExtractorKind::Dates),
            "land_tenure" | "land-tenure" | "tenure" => Some(ExtractorKind::LandTenure),
            "project_id" | "project-id" | "project_ids" | "identifier" => {
                Some(ExtractorKind::ProjectId)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for kind in ExtractorKind::ALL {
            assert_eq!(ExtractorKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ExtractorKind::parse("Tenure"), Some(ExtractorKind::LandTenure));
        assert_eq!(ExtractorKind::parse("weather"), None);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&ExtractorKind::LandTenure).unwrap();
        assert_eq!(json, "\"land_tenure\"");
    }
}

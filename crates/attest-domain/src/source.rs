//! Source references for extracted fields

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where in which document a field was found
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceRef {
    /// Document name (e.g., "4997Botany22_Project_Plan.pdf")
    pub document: String,

    /// Free-form location reported by the backend (e.g., "Section 1.2")
    pub location: String,

    /// Optional page number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Optional section heading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl SourceRef {
    /// Create a new source reference
    pub fn new(document: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            location: location.into(),
            page: None,
            section: None,
        }
    }

    /// Attach a page number
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Attach a section heading
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.document)?;
        if !self.location.is_empty() {
            write!(f, ", {}", self.location)?;
        }
        if let Some(page) = self.page {
            write!(f, " (p. {})", page)?;
        }
        Ok(())
    }
}

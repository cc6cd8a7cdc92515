//! Prompt construction for field extraction

use crate::profile::FieldProfile;
use crate::types::ExtractionHints;

/// Builds the prompt for one chunk
pub struct PromptBuilder<'a> {
    profile: &'a FieldProfile,
    text: &'a str,
    document_name: &'a str,
    position: Option<(usize, usize)>,
    hints: Option<&'a ExtractionHints>,
}

impl<'a> PromptBuilder<'a> {
    /// Create a new prompt builder for a chunk of text
    pub fn new(profile: &'a FieldProfile, text: &'a str) -> Self {
        Self {
            profile,
            text,
            document_name: "",
            position: None,
            hints: None,
        }
    }

    /// Name the document the text belongs to
    pub fn with_document(mut self, document_name: &'a str) -> Self {
        self.document_name = document_name;
        self
    }

    /// Mark the text as part `index` (0-based) of `total`
    pub fn with_position(mut self, index: usize, total: usize) -> Self {
        self.position = Some((index, total));
        self
    }

    /// Pass caller hints through to the backend
    pub fn with_hints(mut self, hints: &'a ExtractionHints) -> Self {
        self.hints = Some(hints);
        self
    }

    /// Build the complete extraction prompt
    pub fn build(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str(SYSTEM_PREAMBLE);
        prompt.push_str("\n\n");
        prompt.push_str(self.profile.instructions());
        prompt.push_str("\n\n");

        prompt.push_str("Use one of these field types where it fits: ");
        prompt.push_str(&self.profile.field_types().join(", "));
        prompt.push_str("\n\n");

        if let Some(hints) = self.hints.filter(|h| !h.is_empty()) {
            if !hints.expected_fields.is_empty() {
                prompt.push_str("The caller expects these fields: ");
                prompt.push_str(&hints.expected_fields.join(", "));
                prompt.push('\n');
            }
            if let Some(notes) = hints.notes.as_deref().filter(|n| !n.trim().is_empty()) {
                prompt.push_str("Notes about this document: ");
                prompt.push_str(notes.trim());
                prompt.push('\n');
            }
            prompt.push('\n');
        }

        if !self.document_name.is_empty() {
            prompt.push_str(&format!("Document: {}\n", self.document_name));
        }
        if let Some((index, total)) = self.position.filter(|(_, total)| *total > 1) {
            prompt.push_str(&format!(
                "This is part {} of {}; the parts overlap slightly.\n",
                index + 1,
                total
            ));
        }

        prompt.push_str("Text to analyze:\n");
        prompt.push_str("---\n");
        prompt.push_str(self.text);
        prompt.push_str("\n---\n\n");

        prompt.push_str(OUTPUT_FORMAT_REMINDER);

        prompt
    }
}

const SYSTEM_PREAMBLE: &str = r#"You are extracting structured facts from project documentation.
Every fact you report must be supported by a verbatim quotation from the text below.
Reports without a quotation, or with a quotation that does not appear in the text, are discarded."#;

const OUTPUT_FORMAT_REMINDER: &str = r#"Respond with a JSON array only. Each element must be an object with:
- "value": the extracted value (string, number or boolean)
- "field_type": what the value is
- "confidence": a number between 0 and 1
- "source": where in the text the value appears (section, table or page)
- "raw_text": the exact sentence or phrase you read the value from, copied verbatim
- "reasoning": one short sentence on why the value answers the question
- "page" and "section": optional, when the text shows them

Return [] if the text contains nothing relevant."#;

//! Document chunks

use serde::{Deserialize, Serialize};

/// A bounded slice of a parent document
///
/// Offsets are byte offsets into the parent, so `&doc[start_offset..end_offset]`
/// equals `text`. Neighbouring chunks may overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text
    pub text: String,

    /// Byte offset of the first character in the parent document
    pub start_offset: usize,

    /// Byte offset one past the last character in the parent document
    pub end_offset: usize,
}

impl Chunk {
    /// Create a chunk by slicing the parent document
    ///
    /// # Panics
    /// Panics if the offsets are not on character boundaries of `document`.
    pub fn from_document(document: &str, start_offset: usize, end_offset: usize) -> Self {
        Self {
            text: document[start_offset..end_offset].to_string(),
            start_offset,
            end_offset,
        }
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    /// Whether the chunk is empty
    pub fn is_empty(&self) -> bool {
        self.start_offset == self.end_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_document() {
        let doc = "Project Start Date: 01/01/2022";
        let chunk = Chunk::from_document(doc, 8, 18);
        assert_eq!(chunk.text, "Start Date");
        assert_eq!(chunk.len(), 10);
        assert!(!chunk.is_empty());
    }
}

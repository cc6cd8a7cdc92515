//! Overlapping chunking for long documents
//!
//! Sizes are counted in characters; offsets are byte offsets into the
//! document, always on character boundaries. Each chunk tries to end on a
//! paragraph break, then a sentence end, then whitespace, searching only the
//! back half of its window.

use crate::error::ExtractorError;
use attest_domain::Chunk;

/// Splits documents into overlapping chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
    max_input_chars: usize,
}

impl Chunker {
    /// Create a chunker
    ///
    /// # Errors
    ///
    /// `chunk_size` must be non-zero and larger than `overlap`.
    pub fn new(chunk_size: usize, overlap: usize, max_input_chars: usize) -> Result<Self, ExtractorError> {
        if chunk_size == 0 {
            return Err(ExtractorError::Config("chunk_size must be greater than 0".to_string()));
        }
        if overlap >= chunk_size {
            return Err(ExtractorError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
            max_input_chars,
        })
    }

    /// Chunk a document
    ///
    /// Documents of at most `max_input_chars` characters come back whole.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = bounds.len() - 1;

        if total <= self.max_input_chars {
            return vec![Chunk::from_document(text, 0, text.len())];
        }

        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let hard_end = (start + self.chunk_size).min(total);
            if hard_end == total {
                chunks.push(Chunk::from_document(text, bounds[start], text.len()));
                break;
            }

            let floor = (start + self.chunk_size / 2).max(start + self.overlap + 1);
            let end = find_break(text, &bounds, floor, hard_end).unwrap_or(hard_end);
            chunks.push(Chunk::from_document(text, bounds[start], bounds[end]));
            start = end - self.overlap;
        }
        chunks
    }
}

/// Chunk a document in one call
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    max_input_chars: usize,
) -> Result<Vec<Chunk>, ExtractorError> {
    Ok(Chunker::new(chunk_size, overlap, max_input_chars)?.chunk(text))
}

/// Best cut point (char index) within `floor..=hard_end`
fn find_break(text: &str, bounds: &[usize], floor: usize, hard_end: usize) -> Option<usize> {
    let seg_start = bounds[floor];
    let seg = &text[seg_start..bounds[hard_end]];
    let to_char = |byte: usize| bounds.binary_search(&byte).ok();

    if let Some(i) = seg.rfind("\n\n") {
        return to_char(seg_start + i + 2);
    }

    for (i, c) in seg.char_indices().rev() {
        if matches!(c, '.' | '!' | '?') {
            let cut = seg_start + i + 1;
            if text[cut..].starts_with(char::is_whitespace) {
                return to_char(cut);
            }
        }
    }

    seg.char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .and_then(|(i, c)| to_char(seg_start + i + c.len_utf8()))
}

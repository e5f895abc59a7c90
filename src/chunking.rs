use crate::document::Page;
use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};

/// Window sizes for splitting page text, measured in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    max_chars: usize,
    overlap_chars: usize,
}

impl ChunkConfig {
    /// Validate and create a chunking configuration
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self> {
        if max_chars == 0 {
            return Err(RagError::config("chunk size must be greater than zero"));
        }
        if overlap_chars >= max_chars {
            return Err(RagError::config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap_chars, max_chars
            )));
        }
        Ok(ChunkConfig {
            max_chars,
            overlap_chars,
        })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap_chars(&self) -> usize {
        self.overlap_chars
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        ChunkConfig {
            max_chars: 1000,
            overlap_chars: 200,
        }
    }
}

/// Represents a text chunk with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// The actual text content of this chunk
    pub text: String,
    /// Estimated token count for this chunk
    pub token_count: usize,
    /// Identifier of the source file this chunk was cut from
    pub source_id: String,
    /// 1-based page number within the source
    pub page_number: usize,
    /// Position of this chunk among the chunks of its page
    pub chunk_index: usize,
    /// Character offset of the chunk start in the page text
    pub start_offset: usize,
}

impl TextChunk {
    /// Character offset one past the chunk end in the page text
    pub fn end_offset(&self) -> usize {
        self.start_offset + self.text.chars().count()
    }
}

#[derive(Clone, Copy)]
enum Boundary {
    Paragraph,
    Sentence,
    Word,
}

impl Boundary {
    const PRIORITY: [Boundary; 3] = [Boundary::Paragraph, Boundary::Sentence, Boundary::Word];

    /// Whether cutting right before `chars[pos]` lands on this kind of boundary
    fn matches(self, chars: &[char], pos: usize) -> bool {
        let prev = chars[pos - 1];
        match self {
            Boundary::Paragraph => pos >= 2 && prev == '\n' && chars[pos - 2] == '\n',
            Boundary::Sentence => {
                pos >= 2 && prev.is_whitespace() && matches!(chars[pos - 2], '.' | '!' | '?')
            }
            Boundary::Word => prev.is_whitespace(),
        }
    }
}

/// Split every page into overlapping chunks
pub fn split_pages<'a, I>(pages: I, config: &ChunkConfig) -> Vec<TextChunk>
where
    I: IntoIterator<Item = &'a Page>,
{
    pages
        .into_iter()
        .flat_map(|page| split_page(page, config))
        .collect()
}

/// Split one page into chunks of at most `max_chars` characters.
///
/// Each chunk is a verbatim slice of the page text and consecutive chunks
/// share exactly `overlap_chars` characters. Cuts prefer a paragraph break,
/// then a sentence end, then whitespace, and fall back to a hard cut at
/// `max_chars`; within one kind of boundary the latest position wins.
pub fn split_page(page: &Page, config: &ChunkConfig) -> Vec<TextChunk> {
    if page.text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = page.text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = if chars.len() - start <= config.max_chars {
            chars.len()
        } else {
            find_cut(&chars, start, config)
        };

        let text: String = chars[start..end].iter().collect();
        chunks.push(TextChunk {
            token_count: estimate_token_count(&text),
            text,
            source_id: page.source_id.clone(),
            page_number: page.page_number,
            chunk_index: chunks.len(),
            start_offset: start,
        });

        if end == chars.len() {
            break;
        }
        start = end - config.overlap_chars;
    }

    chunks
}

/// Pick the cut position for a window that does not fit in one chunk.
/// The cut always lies past `start + overlap_chars` so the next window advances.
fn find_cut(chars: &[char], start: usize, config: &ChunkConfig) -> usize {
    let lowest = start + config.overlap_chars + 1;
    let highest = start + config.max_chars;

    Boundary::PRIORITY
        .iter()
        .find_map(|boundary| {
            (lowest..=highest)
                .rev()
                .find(|&pos| boundary.matches(chars, pos))
        })
        .unwrap_or(highest)
}

/// Calculate approximate token count for a text
/// This is a very simple estimation - words plus punctuation
pub fn estimate_token_count(text: &str) -> usize {
    let words = text.split_whitespace().count();
    let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    words + punctuation
}

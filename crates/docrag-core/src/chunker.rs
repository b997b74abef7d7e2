//! Sentence-aware sliding-window chunking.
//!
//! Text is whitespace-normalized, then cut into windows of at most
//! `max_chunk_size` characters. A window that does not reach the end of the
//! text is pulled back to its last `". "` when that boundary sits in the
//! trailing half of the window. Consecutive windows overlap by `overlap`
//! characters, and the cursor always moves forward by at least one character.

use tracing::warn;

use crate::error::{Error, Result};

pub const DEFAULT_MAX_CHUNK_SIZE: usize = 2000;
pub const DEFAULT_OVERLAP: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chunk_size: DEFAULT_MAX_CHUNK_SIZE, overlap: DEFAULT_OVERLAP }
    }
}

impl ChunkingConfig {
    pub fn chunk(&self, text: &str) -> Result<Vec<String>> {
        chunk_text(text, self.max_chunk_size, self.overlap)
    }
}

/// Collapse every whitespace run to one space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split `text` into overlapping chunks that try to end on sentence boundaries.
///
/// Sizes are measured in characters. `max_chunk_size == 0` is rejected;
/// `overlap >= max_chunk_size` is clamped to `max_chunk_size - 1`.
pub fn chunk_text(text: &str, max_chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    if max_chunk_size == 0 {
        return Err(Error::InvalidConfig("max_chunk_size must be greater than 0".to_string()));
    }
    let overlap = if overlap >= max_chunk_size {
        let clamped = max_chunk_size - 1;
        warn!(overlap, max_chunk_size, clamped, "overlap must be smaller than max_chunk_size; clamping");
        clamped
    } else {
        overlap
    };

    let normalized = normalize_whitespace(text);
    let chars: Vec<char> = normalized.chars().collect();
    let text_len = chars.len();
    let min_boundary = max_chunk_size / 2;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < text_len {
        let mut end = (start + max_chunk_size).min(text_len);
        if end < text_len {
            let window = &chars[start..end];
            let floor = window.len().saturating_sub(min_boundary);
            if let Some(brk) = last_sentence_break(window) {
                if brk > floor {
                    end = start + brk + 1;
                }
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= text_len {
            break;
        }
        // at least one character of progress, whatever the overlap
        start = end.saturating_sub(overlap).max(start + 1);
    }
    Ok(chunks)
}

/// Position of the period in the last `". "` of `window`.
fn last_sentence_break(window: &[char]) -> Option<usize> {
    window.windows(2).rposition(|pair| pair[0] == '.' && pair[1] == ' ')
}

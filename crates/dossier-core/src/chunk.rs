//! Sliding-window text chunker.
//!
//! Splits document body text into overlapping windows of `window` characters
//! with `overlap` characters shared between adjacent chunks. Offsets are
//! character offsets and all slicing lands on UTF-8 boundaries.
//!
//! # Algorithm
//!
//! 1. Start at 0; each chunk spans `[start, min(start + window, len))`.
//! 2. The next chunk starts at `end - overlap`.
//! 3. Stop once the next start lands within `overlap` of the end of the
//!    text, because the tail is already covered by the final chunk and
//!    another window would produce a near-duplicate.
//!
//! Text shorter than `window` yields exactly one chunk. Empty text yields
//! no chunks; the ingestion pipeline rejects empty text before chunking.

use crate::error::{Error, Result};

/// A window of source text with its character-offset range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    pub text: String,
    /// Inclusive start, in characters.
    pub start: usize,
    /// Exclusive end, in characters.
    pub end: usize,
}

/// Split `text` into overlapping windows.
///
/// # Guarantees
///
/// - The union of emitted ranges covers `[0, len)` with no gaps.
/// - Adjacent chunks share at most `overlap` characters.
/// - Chunking is deterministic: same input, same boundaries.
///
/// # Errors
///
/// Returns [`Error::Validation`] unless `0 <= overlap < window`.
pub fn sliding_chunks(text: &str, window: usize, overlap: usize) -> Result<Vec<TextWindow>> {
    if window == 0 {
        return Err(Error::Validation("chunk window must be > 0".into()));
    }
    if overlap >= window {
        return Err(Error::Validation(format!(
            "chunk overlap ({overlap}) must be smaller than the window ({window})"
        )));
    }

    // Byte offset of every char boundary, plus the end of the string, so
    // char-coordinate windows can be sliced without splitting a code point.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let end = (start + window).min(len);
        chunks.push(TextWindow {
            text: text[bounds[start]..bounds[end]].to_string(),
            start,
            end,
        });

        let next = end - overlap;
        if next >= len.saturating_sub(overlap) {
            break;
        }
        start = next;
    }

    Ok(chunks)
}

//! Overlapping fixed-size text windows.
//!
//! Documents are split into character windows (default 500 chars with a
//! 50-char overlap) so local context survives chunk boundaries. Splitting is
//! deterministic and UTF-8 boundary safe; whitespace-only windows are
//! dropped.

use crate::extract::PageText;

/// A chunk of page text ready for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedText {
    /// 1-based page number the window was cut from.
    pub page: u32,
    pub content: String,
}

/// Split a single page into overlapping windows.
///
/// `overlap_chars` must be smaller than `window_chars` (enforced by config
/// validation); consecutive windows advance by `window_chars - overlap_chars`
/// characters.
pub fn chunk_text(text: &str, window_chars: usize, overlap_chars: usize) -> Vec<String> {
    debug_assert!(window_chars > overlap_chars);
    let step = window_chars - overlap_chars;

    // Byte offset of every char boundary, so windows never split a code point.
    let boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let total_chars = boundaries.len();

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < total_chars {
        let end = (start + window_chars).min(total_chars);
        let byte_start = boundaries[start];
        let byte_end = if end == total_chars {
            text.len()
        } else {
            boundaries[end]
        };

        let window = text[byte_start..byte_end].trim();
        if !window.is_empty() {
            chunks.push(window.to_string());
        }

        if end == total_chars {
            break;
        }
        start += step;
    }

    chunks
}

/// Split extracted pages into overlapping windows, carrying page numbers.
///
/// A document whose pages yield zero windows overall (e.g. a scanned
/// image-only PDF) is an empty document; the caller rejects it before
/// anything is indexed or persisted.
pub fn chunk_pages(
    pages: &[PageText],
    window_chars: usize,
    overlap_chars: usize,
) -> Vec<ChunkedText> {
    let mut chunks = Vec::new();
    for page in pages {
        for content in chunk_text(&page.text, window_chars, overlap_chars) {
            chunks.push(ChunkedText {
                page: page.page,
                content,
            });
        }
    }
    chunks
}

//! Text splitting for the knowledge-base ingestion pipeline.
//!
//! Raw document text is broken into overlapping passages ("chunk pieces")
//! that are small enough to embed individually while still carrying enough
//! surrounding context to be useful at retrieval time. Splitting prefers
//! semantic boundaries (paragraphs, then lines, then sentences, then words)
//! and only falls back to hard character cuts when a single unit is larger
//! than the configured maximum.
//!
//! Every piece records its byte span in the source text, so callers can
//! attribute retrieved passages back to their exact location. Pieces after
//! the first start `overlap` bytes before the end of the previous piece;
//! stripping that overlap prefix and concatenating the remainders
//! reconstructs the input exactly:
//!
//! ```
//! use ragkb_context::TextSplitter;
//!
//! let text = "First paragraph.\n\nSecond paragraph, somewhat longer than the first.";
//! let splitter = TextSplitter::new(24, 8);
//! let pieces = splitter.split(text);
//!
//! let mut rebuilt = String::new();
//! let mut prev_end = 0;
//! for piece in &pieces {
//!     rebuilt.push_str(&piece.text[prev_end - piece.byte_start..]);
//!     prev_end = piece.byte_end;
//! }
//! assert_eq!(rebuilt, text);
//! ```

use regex::Regex;
use serde::Serialize;
use std::ops::Range;

/// Default delimiters for prose, ordered from most to least significant.
///
/// - `\n\n`: paragraph breaks
/// - `\n`: line breaks
/// - `[.!?]\s+`: sentence ends
/// - ` `: word boundaries, the most granular split
pub const DEFAULT_TEXT_DELIMITERS: &[&str] = &[
    r"\n\n",     // Paragraphs
    r"\n",       // Line breaks
    r"[.!?]\s+", // Sentence ends
    r" ",        // Words
];

/// One overlapping passage of a source text.
///
/// `byte_start..byte_end` is the piece's span in the original text,
/// including the overlap carried over from the previous piece. Sequence
/// numbers are contiguous starting at 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkPiece {
    /// 0-based position of this piece within the document.
    pub sequence: usize,
    /// Byte offset of the first byte of this piece in the source text.
    pub byte_start: usize,
    /// Byte offset one past the last byte of this piece.
    pub byte_end: usize,
    /// The text of this piece, `source[byte_start..byte_end]`.
    pub text: String,
}

/// Splits document text into overlapping, embeddable passages.
///
/// The splitter is deterministic: identical input and configuration always
/// produce identical pieces.
pub struct TextSplitter {
    delimiters: Vec<Regex>,
    max_chunk_size: usize,
    overlap: usize,
}

impl TextSplitter {
    /// Create a splitter with the default prose delimiters.
    ///
    /// `max_chunk_size` bounds the non-overlapping portion of each piece in
    /// bytes; a piece's full span may extend up to `overlap` bytes further
    /// back into its predecessor.
    ///
    /// # Panics
    ///
    /// Panics if `max_chunk_size == 0` or `overlap >= max_chunk_size`.
    /// Callers taking these values from user configuration should validate
    /// them first.
    pub fn new(max_chunk_size: usize, overlap: usize) -> Self {
        Self::with_delimiters(DEFAULT_TEXT_DELIMITERS, max_chunk_size, overlap)
    }

    /// Create a splitter with custom delimiter patterns, applied in order
    /// from most to least significant.
    ///
    /// # Panics
    ///
    /// Panics on invalid regex patterns, `max_chunk_size == 0`, or
    /// `overlap >= max_chunk_size`.
    pub fn with_delimiters(patterns: &[&str], max_chunk_size: usize, overlap: usize) -> Self {
        assert!(max_chunk_size > 0, "max_chunk_size must be positive");
        assert!(
            overlap < max_chunk_size,
            "overlap must be smaller than max_chunk_size"
        );
        let delimiters = patterns
            .iter()
            .map(|&pattern| Regex::new(pattern).unwrap())
            .collect();
        Self {
            delimiters,
            max_chunk_size,
            overlap,
        }
    }

    /// Split `text` into ordered, overlapping pieces.
    ///
    /// The non-overlapping cores of the pieces partition the input exactly:
    /// no byte is dropped and none is covered twice outside the declared
    /// overlap. Empty input yields an empty Vec.
    pub fn split(&self, text: &str) -> Vec<ChunkPiece> {
        if text.is_empty() {
            return Vec::new();
        }

        let segments =
            self.split_recursively_into_segments(text, 0, 0);

        // Greedily pack adjacent segments into cores of at most
        // max_chunk_size bytes. Segments are contiguous and in order, so
        // the cores partition the input.
        let mut cores: Vec<Range<usize>> = Vec::new();
        let mut current: Option<Range<usize>> = None;
        for segment in segments {
            match current.take() {
                Some(range) if range.end - range.start + (segment.end - segment.start)
                    <= self.max_chunk_size =>
                {
                    current = Some(range.start..segment.end);
                }
                Some(range) => {
                    cores.push(range);
                    current = Some(segment);
                }
                None => current = Some(segment),
            }
        }
        if let Some(range) = current {
            cores.push(range);
        }

        // Extend each core (after the first) backwards by the overlap,
        // snapped forward to a char boundary and never past the previous
        // core's start.
        let mut pieces = Vec::with_capacity(cores.len());
        let mut prev_core_start = 0;
        for (sequence, core) in cores.iter().enumerate() {
            let byte_start = if sequence == 0 {
                core.start
            } else {
                let mut start = core.start.saturating_sub(self.overlap).max(prev_core_start);
                while !text.is_char_boundary(start) {
                    start += 1;
                }
                start
            };
            pieces.push(ChunkPiece {
                sequence,
                byte_start,
                byte_end: core.end,
                text: text[byte_start..core.end].to_string(),
            });
            prev_core_start = core.start;
        }

        pieces
    }

    // Recursively split text into byte ranges no larger than
    // max_chunk_size, trying each delimiter in turn and hard-cutting at
    // char boundaries once all delimiters are exhausted. Ranges are
    // returned in order and are contiguous within the slice passed in.
    fn split_recursively_into_segments(
        &self,
        text: &str,
        delimiter_idx: usize,
        offset: usize,
    ) -> Vec<Range<usize>> {
        let mut segments: Vec<Range<usize>> = Vec::new();

        if text.is_empty() {
            return segments;
        }

        if text.len() <= self.max_chunk_size {
            segments.push(offset..offset + text.len());
            return segments;
        }

        if delimiter_idx >= self.delimiters.len() {
            // No delimiter fits: cut at the largest char boundary within
            // the size limit, advancing at least one char per cut.
            let mut local_start = 0;
            while local_start < text.len() {
                let mut local_end = (local_start + self.max_chunk_size).min(text.len());
                while local_end > local_start && !text.is_char_boundary(local_end) {
                    local_end -= 1;
                }
                if local_end == local_start {
                    local_end = local_start + 1;
                    while !text.is_char_boundary(local_end) {
                        local_end += 1;
                    }
                }
                segments.push(offset + local_start..offset + local_end);
                local_start = local_end;
            }
            return segments;
        }

        let delimiter = &self.delimiters[delimiter_idx];
        let mut local_start = 0;
        for mat in delimiter.find_iter(text) {
            if mat.start() > local_start {
                segments.extend(self.split_recursively_into_segments(
                    &text[local_start..mat.start()],
                    delimiter_idx + 1,
                    offset + local_start,
                ));
            }
            // The delimiter itself is kept as a segment so nothing is lost.
            segments.push(offset + mat.start()..offset + mat.end());
            local_start = mat.end();
        }

        if local_start < text.len() {
            segments.extend(self.split_recursively_into_segments(
                &text[local_start..],
                delimiter_idx + 1,
                offset + local_start,
            ));
        }

        segments
    }
}

//! Sentence-aware text chunker.
//!
//! Text is cut into pieces on Unicode sentence boundaries (every line break
//! ends a sentence, so paragraphs are always boundaries). Sentences longer
//! than the chunk size fall back to word boundaries, and words longer than
//! the chunk size are cut at character boundaries. Pieces are then packed
//! greedily into chunks of at most `chunk_size` characters.
//!
//! With a non-zero overlap every chunk after the first starts up to
//! `chunk_overlap` characters before the end of the previous one, snapped
//! forward to the start of a word.

use thiserror::Error;
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkerError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },
}

/// A chunk of a larger text, with byte offsets into the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Sizes are in characters.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkerError> {
        if chunk_size == 0 {
            return Err(ChunkerError::ZeroChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkerError::OverlapTooLarge {
                overlap: chunk_overlap,
                size: chunk_size,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into trimmed, non-empty chunks.
    ///
    /// Empty or whitespace-only input yields no chunks.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        if text.trim().is_empty() {
            return chunks;
        }

        let mut current: Option<(usize, usize, usize)> = None;
        for (start, end, chars) in self.pieces(text) {
            let Some((chunk_start, chunk_end, chunk_chars)) = current else {
                current = Some((start, end, chars));
                continue;
            };

            if chunk_chars + chars <= self.chunk_size {
                current = Some((chunk_start, end, chunk_chars + chars));
                continue;
            }

            push_chunk(&mut chunks, text, chunk_start, chunk_end);
            let next_start = self.overlap_start(text, chunk_start, chunk_end, chars);
            let next_chars = text[next_start..chunk_end].chars().count() + chars;
            current = Some((next_start, end, next_chars));
        }

        if let Some((chunk_start, chunk_end, _)) = current {
            push_chunk(&mut chunks, text, chunk_start, chunk_end);
        }
        chunks
    }

    /// Contiguous `(start, end, char_count)` pieces covering `text`, none
    /// longer than the chunk size.
    fn pieces(&self, text: &str) -> Vec<(usize, usize, usize)> {
        let mut pieces = Vec::new();
        for (offset, sentence) in text.split_sentence_bound_indices() {
            let chars = sentence.chars().count();
            if chars <= self.chunk_size {
                pieces.push((offset, offset + sentence.len(), chars));
                continue;
            }
            for (word_offset, word) in sentence.split_word_bound_indices() {
                let word_start = offset + word_offset;
                let chars = word.chars().count();
                if chars <= self.chunk_size {
                    pieces.push((word_start, word_start + word.len(), chars));
                } else {
                    self.hard_cut(word, word_start, &mut pieces);
                }
            }
        }
        pieces
    }

    fn hard_cut(&self, word: &str, base: usize, pieces: &mut Vec<(usize, usize, usize)>) {
        let mut piece_start = 0;
        let mut chars = 0;
        for (i, _) in word.char_indices() {
            if chars == self.chunk_size {
                pieces.push((base + piece_start, base + i, chars));
                piece_start = i;
                chars = 0;
            }
            chars += 1;
        }
        if chars > 0 {
            pieces.push((base + piece_start, base + word.len(), chars));
        }
    }

    /// Where the chunk following `[prev_start, prev_end)` begins, given that
    /// its first piece (starting at `prev_end`) is `next_chars` long.
    fn overlap_start(&self, text: &str, prev_start: usize, prev_end: usize, next_chars: usize) -> usize {
        let budget = self
            .chunk_overlap
            .min(self.chunk_size.saturating_sub(next_chars));
        if budget == 0 {
            return prev_end;
        }
        let start = chars_before(text, prev_end, budget).max(prev_start);
        snap_to_word_start(text, start, prev_end)
    }
}

/// Byte offset `n` characters before `end`, or 0.
fn chars_before(text: &str, end: usize, n: usize) -> usize {
    text[..end]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map_or(0, |(i, _)| i)
}

fn snap_to_word_start(text: &str, start: usize, limit: usize) -> usize {
    let at_boundary = text[..start]
        .chars()
        .next_back()
        .map_or(true, char::is_whitespace);
    if at_boundary {
        return start;
    }
    text[start..limit]
        .find(char::is_whitespace)
        .map_or(limit, |offset| start + offset)
}

fn push_chunk(chunks: &mut Vec<TextChunk>, text: &str, start: usize, end: usize) {
    let raw = &text[start..end];
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let start = start + (raw.len() - raw.trim_start().len());
    chunks.push(TextChunk {
        index: chunks.len(),
        text: trimmed.to_string(),
        start,
        end: start + trimmed.len(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(text: &str, chunks: &[TextChunk]) {
        let mut covered_to = 0;
        for chunk in chunks {
            assert_eq!(&text[chunk.start..chunk.end], chunk.text);
            if chunk.start > covered_to {
                assert!(
                    text[covered_to..chunk.start].trim().is_empty(),
                    "gap before chunk {} is not whitespace",
                    chunk.index
                );
            }
            covered_to = covered_to.max(chunk.end);
        }
        assert!(text[covered_to..].trim().is_empty());
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert_eq!(Chunker::new(0, 0), Err(ChunkerError::ZeroChunkSize));
        assert_eq!(
            Chunker::new(10, 10),
            Err(ChunkerError::OverlapTooLarge {
                overlap: 10,
                size: 10
            })
        );
        assert!(Chunker::new(10, 9).is_ok());
    }

    #[test]
    fn empty_and_blank_text_yield_nothing() {
        let chunker = Chunker::new(100, 0).unwrap();
        assert!(chunker.split("").is_empty());
        assert!(chunker.split(" \n\t\n ").is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunker = Chunker::new(1000, 0).unwrap();
        let text = "The sky is blue. Water boils at 100°C.";
        let chunks = chunker.split(text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn prefers_sentence_boundaries() {
        let chunker = Chunker::new(20, 0).unwrap();
        let chunks = chunker.split("One two three. Four five six.");
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["One two three.", "Four five six."]);
    }

    #[test]
    fn paragraphs_are_boundaries() {
        let chunker = Chunker::new(30, 0).unwrap();
        let text = "First paragraph here\n\nSecond paragraph here";
        let chunks = chunker.split(text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "First paragraph here");
        assert_eq!(chunks[1].text, "Second paragraph here");
        assert_covers(text, &chunks);
    }

    #[test]
    fn long_sentences_fall_back_to_words_then_characters() {
        let chunker = Chunker::new(10, 0).unwrap();
        let text = format!("tiny {} end", "x".repeat(25));
        let chunks = chunker.split(&text);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 10, "{:?}", chunk.text);
        }
        assert_eq!(chunks.first().unwrap().text, "tiny");
        assert!(chunks.last().unwrap().text.ends_with("end"));
        assert_covers(&text, &chunks);
    }

    #[test]
    fn chunks_never_exceed_size_and_cover_text() {
        let text = (0..40)
            .map(|i| format!("Sentence number {i} talks about topic {}.", i % 7))
            .collect::<Vec<_>>()
            .join(" ");
        for (size, overlap) in [(25, 0), (60, 10), (200, 50), (37, 36)] {
            let chunker = Chunker::new(size, overlap).unwrap();
            let chunks = chunker.split(&text);
            assert!(!chunks.is_empty());
            for (i, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.index, i);
                assert!(!chunk.text.is_empty());
                assert!(chunk.text.chars().count() <= size);
            }
            assert_covers(&text, &chunks);
        }
    }

    #[test]
    fn overlap_repeats_the_tail_of_the_previous_chunk() {
        let chunker = Chunker::new(40, 15).unwrap();
        let text = "Alpha beta gamma delta. Epsilon zeta eta theta. Iota kappa lambda mu.";
        let chunks = chunker.split(text);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            assert!(pair[1].start < pair[0].end, "expected overlap between {pair:?}");
            assert!(pair[1].start >= pair[0].start);
            let overlap = text[pair[1].start..pair[0].end].chars().count();
            assert!(overlap <= 15);
        }
        assert_covers(text, &chunks);
    }

    #[test]
    fn zero_overlap_chunks_are_disjoint() {
        let chunker = Chunker::new(30, 0).unwrap();
        let text = "Alpha beta gamma delta. Epsilon zeta eta theta. Iota kappa lambda mu.";
        let chunks = chunker.split(text);
        for pair in chunks.windows(2) {
            assert!(pair[1].start >= pair[0].end);
        }
    }

    #[test]
    fn multibyte_text_is_cut_on_char_boundaries() {
        let chunker = Chunker::new(4, 1).unwrap();
        let text = "┌──────────┐ 日本語のテキスト ünïcödé";
        let chunks = chunker.split(text);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 4);
        }
        assert_covers(text, &chunks);
    }

    #[test]
    fn deterministic() {
        let chunker = Chunker::new(16, 4).unwrap();
        let text = "Alpha\n\nBeta gamma delta\n\nGamma epsilon zeta eta";
        assert_eq!(chunker.split(text), chunker.split(text));
    }
}

//! Text chunking with overlap for embedding.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ChunkError;
use crate::models::{Chunk, ChunkMode, ChunkingConfig};

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+(?:['\-]\w+)*|[^\w\s]").unwrap());

/// Splits normalized text into bounded, overlapping token windows.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum tokens per chunk
    chunk_size: usize,
    /// Tokens shared between consecutive chunks
    overlap: usize,
}

impl TextChunker {
    /// Create a chunker, rejecting an overlap that would stop the window advancing.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if chunk_size == 0 {
            return Err(ChunkError::InvalidChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkError::InvalidOverlap {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ChunkError> {
        Self::new(config.chunk_size as usize, config.chunk_overlap as usize)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk `text` into an ordered sequence. Empty text yields no chunks.
    pub fn chunk(&self, text: &str, mode: ChunkMode) -> Vec<Chunk> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Vec::new();
        }

        match mode {
            ChunkMode::TokenWindow => self.chunk_by_tokens(&tokens),
            ChunkMode::SentencePreserving => self.chunk_by_sentences(&tokens),
        }
    }

    fn chunk_by_tokens(&self, tokens: &[String]) -> Vec<Chunk> {
        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < tokens.len() {
            let end = (start + self.chunk_size).min(tokens.len());
            chunks.push(Chunk::new(tokens, start, end, chunks.len()));

            if end == tokens.len() {
                break;
            }
            start += step;
        }

        chunks
    }

    fn chunk_by_sentences(&self, tokens: &[String]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        // Buffer is always a contiguous token range [start, end).
        let mut buffer: Option<(usize, usize)> = None;

        for (sent_start, sent_end) in sentence_spans(tokens) {
            let sent_size = sent_end - sent_start;

            buffer = match buffer {
                Some((start, end)) if (end - start) + sent_size > self.chunk_size => {
                    chunks.push(Chunk::new(tokens, start, end, chunks.len()));
                    let carried = self.overlap.min(end - start);
                    Some((end - carried, sent_end))
                }
                Some((start, _)) => Some((start, sent_end)),
                None => Some((sent_start, sent_end)),
            };
        }

        if let Some((start, end)) = buffer {
            chunks.push(Chunk::new(tokens, start, end, chunks.len()));
        }

        chunks
    }
}

/// Chunk `text` with the given window parameters.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    mode: ChunkMode,
) -> Result<Vec<Chunk>, ChunkError> {
    Ok(TextChunker::new(chunk_size, overlap)?.chunk(text, mode))
}

/// Split text into word and punctuation tokens. Whitespace is never a token.
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Number of tokens `text` would be chunked into.
pub fn count_tokens(text: &str) -> usize {
    TOKEN_RE.find_iter(text).count()
}

fn is_terminator(token: &str) -> bool {
    matches!(token, "." | "!" | "?")
}

/// Token ranges of each sentence. Runs of terminators ("?!", "...") close one sentence.
fn sentence_spans(tokens: &[String]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;

    for (i, token) in tokens.iter().enumerate() {
        let next_is_terminator = tokens.get(i + 1).is_some_and(|t| is_terminator(t));
        if is_terminator(token) && !next_is_terminator {
            spans.push((start, i + 1));
            start = i + 1;
        }
    }

    if start < tokens.len() {
        spans.push((start, tokens.len()));
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_tokenize_splits_words_and_punctuation() {
        assert_eq!(
            tokenize("state-of-the-art models don't fail, usually."),
            vec!["state-of-the-art", "models", "don't", "fail", ",", "usually", "."]
        );
        assert!(tokenize("   \n ").is_empty());
        assert_eq!(count_tokens("a b, c."), 5);
    }

    #[test]
    fn test_sentence_spans() {
        let tokens = tokenize("one two. three?! four");
        assert_eq!(sentence_spans(&tokens), vec![(0, 3), (3, 6), (6, 7)]);
    }

    #[test]
    fn test_rejects_overlap_equal_to_size() {
        assert!(matches!(
            TextChunker::new(10, 10),
            Err(ChunkError::InvalidOverlap { .. })
        ));
        assert!(matches!(
            TextChunker::new(0, 0),
            Err(ChunkError::InvalidChunkSize)
        ));
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        let chunker = TextChunker::new(10, 2).unwrap();
        assert!(chunker.chunk("", ChunkMode::TokenWindow).is_empty());
        assert!(chunker.chunk("  ", ChunkMode::SentencePreserving).is_empty());
    }

    #[test]
    fn test_token_window_covers_every_token_with_exact_overlap() {
        for (n, size, overlap) in [(1, 3, 0), (10, 3, 1), (25, 7, 3), (100, 10, 9), (9, 3, 0)] {
            let chunks = chunk_text(&words(n), size, overlap, ChunkMode::TokenWindow).unwrap();
            assert!(!chunks.is_empty());

            let mut covered = vec![false; n];
            for chunk in &chunks {
                assert!(chunk.token_count <= size);
                assert_eq!(chunk.token_count, chunk.end_token - chunk.start_token);
                covered[chunk.start_token..chunk.end_token]
                    .iter_mut()
                    .for_each(|c| *c = true);
            }
            assert!(covered.iter().all(|c| *c), "n={n} size={size} overlap={overlap}");

            for pair in chunks.windows(2) {
                assert_eq!(pair[0].end_token - pair[1].start_token, overlap);
            }
            assert_eq!(chunks.last().unwrap().end_token, n);
        }
    }

    #[test]
    fn test_token_window_sequence_ids_and_text() {
        let chunks = chunk_text("a b c d e", 2, 0, ChunkMode::TokenWindow).unwrap();
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a b", "c d", "e"]);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence_id, i);
        }
    }

    #[test]
    fn test_sentence_mode_keeps_sentences_whole() {
        // Each sentence is 4 tokens including the period.
        let text = "a b c. d e f. g h i. j k l.";
        let chunks = chunk_text(text, 8, 0, ChunkMode::SentencePreserving).unwrap();
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a b c . d e f .", "g h i . j k l ."]);
        assert_eq!(chunks[1].start_token, 8);
        assert_eq!(chunks[1].end_token, 16);
    }

    #[test]
    fn test_sentence_mode_seeds_overlap_from_previous_buffer() {
        let text = "a b c. d e f. g h i.";
        let chunks = chunk_text(text, 8, 2, ChunkMode::SentencePreserving).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "a b c . d e f .");
        assert_eq!(chunks[1].text, "f . g h i .");
        assert_eq!(chunks[1].start_token, 6);
        assert_eq!(chunks[1].token_count, 6);
    }

    #[test]
    fn test_sentence_mode_oversized_sentence_is_its_own_chunk() {
        let long = words(12);
        let text = format!("short one. {long}. tail end.");
        let chunks = chunk_text(&text, 5, 0, ChunkMode::SentencePreserving).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "short one .");
        assert_eq!(chunks[1].token_count, 13);
        assert_eq!(chunks[2].text, "tail end .");
    }

    #[test]
    fn test_sentence_mode_text_without_terminator() {
        let chunks = chunk_text("no full stop here", 10, 1, ChunkMode::SentencePreserving).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].token_count, 4);
    }

    #[test]
    fn test_chunking_is_restartable() {
        let chunker = TextChunker::new(6, 2).unwrap();
        let text = "first sentence here. second one follows. and a third closes it.";
        assert_eq!(
            chunker.chunk(text, ChunkMode::SentencePreserving),
            chunker.chunk(text, ChunkMode::SentencePreserving)
        );
    }
}

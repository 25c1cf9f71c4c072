use serde::{Deserialize, Serialize};

/// How the chunker decides where one chunk ends and the next begins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkMode {
    /// Fixed windows of tokens, advancing by `chunk_size - overlap`.
    TokenWindow,
    /// Whole sentences accumulated up to `chunk_size` tokens.
    #[default]
    SentencePreserving,
}

impl std::str::FromStr for ChunkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "token_window" | "tokens" => Ok(ChunkMode::TokenWindow),
            "sentence_preserving" | "sentences" => Ok(ChunkMode::SentencePreserving),
            _ => Err(format!("unknown chunk mode: {}", s)),
        }
    }
}

impl std::fmt::Display for ChunkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkMode::TokenWindow => write!(f, "token_window"),
            ChunkMode::SentencePreserving => write!(f, "sentence_preserving"),
        }
    }
}

/// A bounded span of a document's tokens, the unit of embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub token_count: usize,
    /// First token index covered (inclusive).
    pub start_token: usize,
    /// One past the last token index covered.
    pub end_token: usize,
    /// 0-based position of the chunk within its document.
    pub sequence_id: usize,
}

impl Chunk {
    pub fn new(
        tokens: &[String],
        start_token: usize,
        end_token: usize,
        sequence_id: usize,
    ) -> Self {
        let span = &tokens[start_token..end_token];
        Self {
            text: span.join(" "),
            token_count: span.len(),
            start_token,
            end_token,
            sequence_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_mode_parse() {
        assert_eq!(
            "token_window".parse::<ChunkMode>().unwrap(),
            ChunkMode::TokenWindow
        );
        assert_eq!(
            "Sentences".parse::<ChunkMode>().unwrap(),
            ChunkMode::SentencePreserving
        );
        assert!("paragraphs".parse::<ChunkMode>().is_err());
    }

    #[test]
    fn test_chunk_from_token_span() {
        let tokens: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let chunk = Chunk::new(&tokens, 1, 3, 0);
        assert_eq!(chunk.text, "b c");
        assert_eq!(chunk.token_count, 2);
        assert_eq!(chunk.start_token, 1);
        assert_eq!(chunk.end_token, 3);
    }
}

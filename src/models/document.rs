use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::chunk::Chunk;

/// A paper's extracted text queued for embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub paper_id: i64,
    pub text: String,
    /// Caller-supplied fields copied onto every chunk's metadata record.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Document {
    pub fn new(paper_id: i64, text: impl Into<String>) -> Self {
        Self {
            paper_id,
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Metadata attached to one stored vector.
///
/// The fixed fields are always present; anything else the caller wants to
/// carry goes in `extra`. Keys in `extra` never shadow the fixed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub paper_id: i64,
    pub chunk_sequence_id: usize,
    pub text_preview: String,
    pub token_count: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl MetadataRecord {
    pub fn new(
        paper_id: i64,
        chunk_sequence_id: usize,
        text_preview: impl Into<String>,
        token_count: usize,
    ) -> Self {
        Self {
            paper_id,
            chunk_sequence_id,
            text_preview: text_preview.into(),
            token_count,
            extra: BTreeMap::new(),
        }
    }

    /// Build the record for one chunk, bounding the preview to `preview_chars` characters.
    pub fn from_chunk(
        paper_id: i64,
        chunk: &Chunk,
        preview_chars: usize,
        extra: &BTreeMap<String, Value>,
    ) -> Self {
        Self {
            paper_id,
            chunk_sequence_id: chunk.sequence_id,
            text_preview: preview(&chunk.text, preview_chars),
            token_count: chunk.token_count,
            extra: extra.clone(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            token_count: text.split_whitespace().count(),
            start_token: 0,
            end_token: text.split_whitespace().count(),
            sequence_id: 3,
        }
    }

    #[test]
    fn test_preview_is_bounded_by_chars() {
        let extra = BTreeMap::new();
        let record = MetadataRecord::from_chunk(7, &chunk("héllo wörld again"), 7, &extra);
        assert_eq!(record.text_preview, "héllo w");
        assert_eq!(record.chunk_sequence_id, 3);
        assert_eq!(record.paper_id, 7);
    }

    #[test]
    fn test_short_text_preview_unchanged() {
        let extra = BTreeMap::new();
        let record = MetadataRecord::from_chunk(1, &chunk("short"), 200, &extra);
        assert_eq!(record.text_preview, "short");
    }

    #[test]
    fn test_extra_fields_are_copied() {
        let doc = Document::new(9, "text").with_metadata("title", "Attention");
        let record = MetadataRecord::from_chunk(doc.paper_id, &chunk("text"), 200, &doc.metadata);
        assert_eq!(record.extra.get("title"), Some(&Value::from("Attention")));
    }

    #[test]
    fn test_record_json_roundtrip_omits_empty_extra() {
        let record = MetadataRecord::new(1, 0, "preview", 4);
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("extra"));
        let back: MetadataRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}

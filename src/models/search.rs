//! Search-related models for results and statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Vid;

/// Index variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexVariant {
    /// Brute-force search over every stored vector
    #[default]
    Exact,
    /// Inverted-file search over k-means partitions; needs training
    Approximate,
}

impl std::str::FromStr for IndexVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" | "flat" => Ok(IndexVariant::Exact),
            "approximate" | "ivf" => Ok(IndexVariant::Approximate),
            _ => Err(format!("unknown index variant: {}", s)),
        }
    }
}

impl std::fmt::Display for IndexVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexVariant::Exact => write!(f, "exact"),
            IndexVariant::Approximate => write!(f, "approximate"),
        }
    }
}

/// Convert a squared L2 distance to a bounded ranking score.
///
/// Distance 0 maps to 1.0 and the score decreases monotonically. It is not a
/// probability.
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

/// A single search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Vector identifier of the matching chunk
    pub vid: Vid,

    pub paper_id: i64,

    pub chunk_sequence_id: usize,

    pub text_preview: String,

    pub token_count: usize,

    /// Caller-supplied metadata stored with the chunk
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,

    /// Embedding similarity, `1 / (1 + distance)`
    pub similarity: Option<f32>,

    /// Lexical relevance from a keyword search, when one was merged in
    pub relevance: Option<f32>,
}

/// Aggregate counts from a batched ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub total_chunks: usize,
    /// Set when the run stopped early because cancellation was requested
    pub cancelled: bool,
}

impl BatchStats {
    pub fn avg_chunks_per_document(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.total_chunks as f64 / self.processed as f64
        }
    }

    /// Documents neither processed nor failed (skipped by cancellation).
    pub fn skipped(&self) -> usize {
        self.total - self.processed - self.failed
    }
}

/// Snapshot of the vector store's size and configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub total_vectors: usize,
    pub dimension: usize,
    pub embedding_model: String,
    pub index_variant: IndexVariant,
    pub metadata_entries: usize,
    pub next_vid: Vid,
    pub trained: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_variant_parse() {
        assert_eq!("exact".parse::<IndexVariant>().unwrap(), IndexVariant::Exact);
        assert_eq!("IVF".parse::<IndexVariant>().unwrap(), IndexVariant::Approximate);
        assert!("hnsw".parse::<IndexVariant>().is_err());
    }

    #[test]
    fn test_similarity_from_distance() {
        assert_eq!(similarity_from_distance(0.0), 1.0);
        assert!(similarity_from_distance(0.5) > similarity_from_distance(1.0));
        assert!((similarity_from_distance(1.0) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_batch_stats_average() {
        let stats = BatchStats {
            total: 4,
            processed: 2,
            failed: 1,
            total_chunks: 7,
            cancelled: true,
        };
        assert!((stats.avg_chunks_per_document() - 3.5).abs() < f64::EPSILON);
        assert_eq!(stats.skipped(), 1);
        assert_eq!(BatchStats::default().avg_chunks_per_document(), 0.0);
    }
}

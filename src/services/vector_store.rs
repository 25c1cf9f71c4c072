//! Vector index and metadata kept in lockstep.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::error::IndexError;
use crate::models::{IndexConfig, IndexStatistics, MetadataRecord, Vid};
use crate::services::metadata::MetadataStore;
use crate::services::vector_index::VectorIndex;

/// A search hit joined with its metadata record.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredHit {
    pub vid: Vid,
    /// Squared L2 distance to the query
    pub distance: f32,
    pub record: MetadataRecord,
}

/// Owns the vector index, its metadata and the identifier of the model that
/// produced the vectors.
///
/// Every mutation goes through this type so a VID never exists without a
/// record or vice versa.
#[derive(Debug, Clone)]
pub struct VectorStore {
    index: VectorIndex,
    metadata: MetadataStore,
    embedding_model: String,
}

impl VectorStore {
    pub fn new(index: VectorIndex, embedding_model: impl Into<String>) -> Self {
        Self {
            index,
            metadata: MetadataStore::new(),
            embedding_model: embedding_model.into(),
        }
    }

    /// Create an empty store using the configured index variant.
    pub fn from_config(
        config: &IndexConfig,
        dimension: usize,
        embedding_model: impl Into<String>,
    ) -> Result<Self, IndexError> {
        let index = VectorIndex::create(config.variant, dimension, Some(config.nlist as usize))?
            .with_nprobe(config.nprobe as usize)
            .with_kmeans_iterations(config.kmeans_iterations as usize);
        Ok(Self::new(index, embedding_model))
    }

    /// Assemble a store from parts loaded elsewhere, checking the key sets agree.
    pub fn from_parts(
        index: VectorIndex,
        metadata: MetadataStore,
        embedding_model: impl Into<String>,
    ) -> Result<Self, IndexError> {
        if index.len() != metadata.len() || metadata.all().any(|(vid, _)| !index.contains(vid)) {
            return Err(IndexError::MetadataMismatch {
                vectors: index.len(),
                records: metadata.len(),
            });
        }
        Ok(Self {
            index,
            metadata,
            embedding_model: embedding_model.into(),
        })
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn train(&mut self, samples: &[Vec<f32>]) -> Result<(), IndexError> {
        self.index.train(samples)
    }

    /// Store `vectors` with one record each. Nothing is stored on error.
    pub fn insert(
        &mut self,
        vectors: &[Vec<f32>],
        records: Vec<MetadataRecord>,
    ) -> Result<Vec<Vid>, IndexError> {
        if vectors.len() != records.len() {
            return Err(IndexError::ShapeMismatch {
                vectors: vectors.len(),
                records: records.len(),
            });
        }

        let vids = self.index.add(vectors)?;
        for (vid, record) in vids.iter().zip(records) {
            self.metadata.put(*vid, record);
        }
        Ok(vids)
    }

    /// Nearest `k` vectors joined with their records.
    ///
    /// A VID without a record is skipped rather than reported as an error.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<StoredHit>, IndexError> {
        let hits = self.index.search(query, k)?;
        Ok(hits
            .into_iter()
            .filter_map(|(vid, distance)| match self.metadata.get(vid) {
                Some(record) => Some(StoredHit {
                    vid,
                    distance,
                    record: record.clone(),
                }),
                None => {
                    warn!("vector {} has no metadata; dropping from results", vid);
                    None
                }
            })
            .collect())
    }

    /// Remove the given vectors by rebuilding the index without them.
    ///
    /// With `compact` the survivors are renumbered from 0; otherwise they keep
    /// their VIDs. Returns how many stored vectors were removed.
    pub fn delete_by_ids(&mut self, vids: &[Vid], compact: bool) -> Result<usize, IndexError> {
        let exclude: HashSet<Vid> = vids
            .iter()
            .copied()
            .filter(|vid| self.index.contains(*vid))
            .collect();
        if exclude.is_empty() {
            return Ok(0);
        }

        info!("deleting {} vectors", exclude.len());
        if compact {
            let rebuilt = self.index.rebuild_excluding(&exclude)?;
            self.index = rebuilt.index;
            self.metadata.remap(&rebuilt.remap);
        } else {
            self.index = self.index.retain_excluding(&exclude)?;
            for vid in &exclude {
                self.metadata.remove(*vid);
            }
        }

        info!(
            "deleted {} vectors, remaining: {}",
            exclude.len(),
            self.index.len()
        );
        Ok(exclude.len())
    }

    /// Remove every chunk belonging to `paper_id`.
    pub fn delete_paper(&mut self, paper_id: i64, compact: bool) -> Result<usize, IndexError> {
        let vids = self.metadata.vids_for_paper(paper_id);
        self.delete_by_ids(&vids, compact)
    }

    /// Drop all vectors and records. Training and the VID counter are kept.
    pub fn clear(&mut self) {
        self.index = self.index.cleared();
        self.metadata.clear();
        info!("vector store cleared");
    }

    pub fn statistics(&self) -> IndexStatistics {
        IndexStatistics {
            total_vectors: self.index.len(),
            dimension: self.index.dimension(),
            embedding_model: self.embedding_model.clone(),
            index_variant: self.index.variant(),
            metadata_entries: self.metadata.len(),
            next_vid: self.index.next_vid(),
            trained: self.index.is_trained(),
        }
    }
}

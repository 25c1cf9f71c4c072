//! In-memory nearest-neighbour index over fixed-dimension vectors.
//!
//! Two variants share one storage layout (ascending VIDs plus row-major
//! vector data):
//!
//! - **Exact** scans every stored vector. Searchable immediately.
//! - **Approximate** partitions vectors around k-means centroids and only
//!   scans the partitions nearest the query. It must be trained before the
//!   first `add`.
//!
//! There is no in-place deletion. Removing vectors means building a new index
//! from the survivors with [`VectorIndex::retain_excluding`] (VIDs kept) or
//! [`VectorIndex::rebuild_excluding`] (VIDs renumbered densely from 0). Both
//! cost O(n) in the number of stored vectors.

pub mod distance;
pub mod ivf;

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::IndexError;
use crate::models::{IndexVariant, Vid};
use distance::squared_l2;
use ivf::{InvertedLists, IvfParams};

pub use distance::l2_normalize;

/// Default partition count for the approximate variant.
pub const DEFAULT_NLIST: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    variant: IndexVariant,
    dimension: usize,
    /// VIDs of stored rows, strictly ascending.
    ids: Vec<Vid>,
    /// Row-major vector data, `ids.len() * dimension` values.
    data: Vec<f32>,
    next_vid: Vid,
    ivf: Option<InvertedLists>,
}

/// Result of a compacting rebuild.
#[derive(Debug, Clone)]
pub struct Rebuilt {
    pub index: VectorIndex,
    /// `(old_vid, new_vid)` for every surviving vector, in ascending order.
    pub remap: Vec<(Vid, Vid)>,
}

/// Plain-data image of an index, used by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub variant: IndexVariant,
    pub dimension: usize,
    pub ivf: Option<IvfParams>,
    pub centroids: Option<Vec<f32>>,
    pub ids: Vec<Vid>,
    pub data: Vec<f32>,
    pub next_vid: Vid,
}

impl VectorIndex {
    /// Allocate an empty index.
    ///
    /// `nlist` is only used by the approximate variant and defaults to
    /// [`DEFAULT_NLIST`].
    pub fn create(
        variant: IndexVariant,
        dimension: usize,
        nlist: Option<usize>,
    ) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::InvalidDimension(dimension));
        }

        let ivf = match variant {
            IndexVariant::Exact => None,
            IndexVariant::Approximate => {
                let nlist = nlist.unwrap_or(DEFAULT_NLIST);
                if nlist == 0 {
                    return Err(IndexError::InvalidClusterCount(nlist));
                }
                Some(InvertedLists::new(IvfParams::new(nlist), dimension))
            }
        };

        info!(
            "created {} index (dimension={}{})",
            variant,
            dimension,
            ivf.as_ref()
                .map(|l| format!(", nlist={}", l.params.nlist))
                .unwrap_or_default()
        );

        Ok(Self {
            variant,
            dimension,
            ids: Vec::new(),
            data: Vec::new(),
            next_vid: 0,
            ivf,
        })
    }

    pub fn exact(dimension: usize) -> Result<Self, IndexError> {
        Self::create(IndexVariant::Exact, dimension, None)
    }

    pub fn approximate(dimension: usize, nlist: usize) -> Result<Self, IndexError> {
        Self::create(IndexVariant::Approximate, dimension, Some(nlist))
    }

    /// Set how many partitions an approximate search scans. No effect on exact indexes.
    #[must_use]
    pub fn with_nprobe(mut self, nprobe: usize) -> Self {
        if let Some(ivf) = self.ivf.as_mut() {
            ivf.params.nprobe = nprobe.max(1);
        }
        self
    }

    /// Cap the k-means iterations used by `train`. No effect on exact indexes.
    #[must_use]
    pub fn with_kmeans_iterations(mut self, iterations: usize) -> Self {
        if let Some(ivf) = self.ivf.as_mut() {
            ivf.params.max_iterations = iterations.max(1);
        }
        self
    }

    pub fn variant(&self) -> IndexVariant {
        self.variant
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// VID the next added vector will receive.
    pub fn next_vid(&self) -> Vid {
        self.next_vid
    }

    /// Live VIDs in ascending order.
    pub fn ids(&self) -> &[Vid] {
        &self.ids
    }

    pub fn contains(&self, vid: Vid) -> bool {
        self.ids.binary_search(&vid).is_ok()
    }

    pub fn nlist(&self) -> Option<usize> {
        self.ivf.as_ref().map(|l| l.params.nlist)
    }

    /// Exact indexes are always trained.
    pub fn is_trained(&self) -> bool {
        self.ivf.as_ref().is_none_or(InvertedLists::is_trained)
    }

    /// Train the approximate variant's partitions on `samples`.
    ///
    /// A no-op on exact indexes and on indexes that are already trained.
    pub fn train(&mut self, samples: &[Vec<f32>]) -> Result<(), IndexError> {
        let dimension = self.dimension;
        let Some(ivf) = self.ivf.as_mut() else {
            info!("exact index does not require training");
            return Ok(());
        };
        if ivf.is_trained() {
            info!("index is already trained");
            return Ok(());
        }

        validate_dimensions(samples, dimension)?;
        if samples.len() < ivf.params.nlist {
            return Err(IndexError::InsufficientTrainingData {
                required: ivf.params.nlist,
                actual: samples.len(),
            });
        }

        info!("training index with {} samples", samples.len());
        let iterations = ivf.train(samples);
        info!("index training complete after {} iterations", iterations);
        Ok(())
    }

    /// Append `vectors` in order, returning the VID assigned to each.
    ///
    /// All vectors are validated before any is stored.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Vec<Vid>, IndexError> {
        if !self.is_trained() {
            return Err(IndexError::NotTrained);
        }
        validate_dimensions(vectors, self.dimension)?;

        let mut assigned = Vec::with_capacity(vectors.len());
        for vector in vectors {
            let vid = self.next_vid;
            self.push_row(vid, vector);
            self.next_vid += 1;
            assigned.push(vid);
        }

        debug!("added {} vectors, total {}", vectors.len(), self.len());
        Ok(assigned)
    }

    /// The `k` nearest stored vectors as `(vid, squared_distance)`.
    ///
    /// Ordered by ascending distance, ties broken by lower VID.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Vid, f32)>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let score = |row: usize| (self.ids[row], squared_l2(self.row(row), query));
        let mut scored: Vec<(Vid, f32)> = match &self.ivf {
            Some(ivf) => ivf.candidates(query).into_iter().map(score).collect(),
            None => (0..self.len()).map(score).collect(),
        };

        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, compare_hits);
            scored.truncate(k);
        }
        scored.sort_by(compare_hits);
        Ok(scored)
    }

    /// The exact stored vector for a live VID.
    pub fn reconstruct(&self, vid: Vid) -> Result<Vec<f32>, IndexError> {
        self.ids
            .binary_search(&vid)
            .map(|row| self.row(row).to_vec())
            .map_err(|_| IndexError::NotFound(vid))
    }

    /// New index holding every vector not in `exclude`, with VIDs and the
    /// VID counter unchanged.
    pub fn retain_excluding(&self, exclude: &HashSet<Vid>) -> Result<Self, IndexError> {
        let mut index = self.empty_like();
        for &vid in self.ids.iter().filter(|vid| !exclude.contains(vid)) {
            let vector = self.reconstruct(vid)?;
            index.push_row(vid, &vector);
        }
        index.next_vid = self.next_vid;

        info!(
            "rebuilt index keeping ids: {} removed, {} remaining",
            self.len() - index.len(),
            index.len()
        );
        Ok(index)
    }

    /// New index holding every vector not in `exclude`, renumbered densely from 0.
    ///
    /// Callers holding metadata keyed by the old VIDs must apply `remap`.
    pub fn rebuild_excluding(&self, exclude: &HashSet<Vid>) -> Result<Rebuilt, IndexError> {
        let mut index = self.empty_like();
        let mut remap = Vec::with_capacity(self.len());

        for &vid in self.ids.iter().filter(|vid| !exclude.contains(vid)) {
            let vector = self.reconstruct(vid)?;
            let new_vid = index.next_vid;
            index.push_row(new_vid, &vector);
            index.next_vid += 1;
            remap.push((vid, new_vid));
        }

        info!(
            "compacted index: {} removed, {} remaining",
            self.len() - index.len(),
            index.len()
        );
        Ok(Rebuilt { index, remap })
    }

    /// Empty index with the same variant, training and VID counter.
    pub fn cleared(&self) -> Self {
        let mut index = self.empty_like();
        index.next_vid = self.next_vid;
        index
    }

    pub fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            variant: self.variant,
            dimension: self.dimension,
            ivf: self.ivf.as_ref().map(|l| l.params.clone()),
            centroids: self
                .ivf
                .as_ref()
                .and_then(|l| l.centroids().map(<[f32]>::to_vec)),
            ids: self.ids.clone(),
            data: self.data.clone(),
            next_vid: self.next_vid,
        }
    }

    /// Rebuild an index from a snapshot, checking it is internally consistent.
    pub fn from_snapshot(snapshot: IndexSnapshot) -> Result<Self, IndexError> {
        let IndexSnapshot {
            variant,
            dimension,
            ivf,
            centroids,
            ids,
            data,
            next_vid,
        } = snapshot;
        let invalid = |reason: String| Err(IndexError::InvalidSnapshot(reason));

        if dimension == 0 {
            return invalid("dimension is zero".to_string());
        }
        if data.len() != ids.len() * dimension {
            return invalid(format!(
                "{} values stored for {} vectors of dimension {}",
                data.len(),
                ids.len(),
                dimension
            ));
        }
        if ids.windows(2).any(|w| w[0] >= w[1]) {
            return invalid("vector ids are not strictly ascending".to_string());
        }
        if ids.last().is_some_and(|&last| last >= next_vid) {
            return invalid(format!("next id {} is not above every stored id", next_vid));
        }

        let lists = match (variant, ivf) {
            (IndexVariant::Exact, None) => None,
            (IndexVariant::Approximate, Some(params)) => {
                if params.nlist == 0 {
                    return invalid("approximate index has zero partitions".to_string());
                }
                let mut lists = InvertedLists::new(params, dimension);
                match centroids {
                    Some(c) if c.len() == lists.params.nlist * dimension => {
                        lists.set_centroids(c)
                    }
                    Some(c) => {
                        return invalid(format!(
                            "{} centroid values for {} partitions",
                            c.len(),
                            lists.params.nlist
                        ));
                    }
                    None if !ids.is_empty() => {
                        return invalid("untrained approximate index holds vectors".to_string());
                    }
                    None => {}
                }
                Some(lists)
            }
            (variant, _) => {
                return invalid(format!(
                    "partition parameters do not match {} variant",
                    variant
                ));
            }
        };

        let mut index = Self {
            variant,
            dimension,
            ids: Vec::with_capacity(ids.len()),
            data: Vec::with_capacity(data.len()),
            next_vid,
            ivf: lists,
        };
        for (vid, vector) in ids.iter().zip(data.chunks_exact(dimension)) {
            index.push_row(*vid, vector);
        }
        Ok(index)
    }

    fn empty_like(&self) -> Self {
        Self {
            variant: self.variant,
            dimension: self.dimension,
            ids: Vec::new(),
            data: Vec::new(),
            next_vid: 0,
            ivf: self.ivf.as_ref().map(InvertedLists::empty_like),
        }
    }

    fn push_row(&mut self, vid: Vid, vector: &[f32]) {
        let row = self.ids.len();
        self.ids.push(vid);
        self.data.extend_from_slice(vector);
        if let Some(ivf) = self.ivf.as_mut() {
            ivf.assign(row, vector);
        }
    }

    fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.dimension..(row + 1) * self.dimension]
    }
}

fn compare_hits(a: &(Vid, f32), b: &(Vid, f32)) -> Ordering {
    a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
}

fn validate_dimensions(vectors: &[Vec<f32>], dimension: usize) -> Result<(), IndexError> {
    match vectors.iter().find(|v| v.len() != dimension) {
        Some(bad) => Err(IndexError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        }),
        None => Ok(()),
    }
}

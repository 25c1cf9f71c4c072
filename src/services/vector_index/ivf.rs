//! Inverted-file partitioning for the approximate index variant.

use serde::{Deserialize, Serialize};

use super::distance::squared_l2;

/// Default number of partitions scanned per query.
pub const DEFAULT_NPROBE: usize = 8;
/// Default cap on Lloyd iterations during training.
pub const DEFAULT_KMEANS_ITERATIONS: usize = 25;

/// Partition parameters that survive a rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvfParams {
    pub nlist: usize,
    pub nprobe: usize,
    pub max_iterations: usize,
}

impl IvfParams {
    pub fn new(nlist: usize) -> Self {
        Self {
            nlist,
            nprobe: DEFAULT_NPROBE,
            max_iterations: DEFAULT_KMEANS_ITERATIONS,
        }
    }
}

/// Centroids plus, for each partition, the storage rows assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct InvertedLists {
    pub params: IvfParams,
    dimension: usize,
    /// Row-major `nlist * dimension`, `None` until trained.
    centroids: Option<Vec<f32>>,
    lists: Vec<Vec<usize>>,
}

impl InvertedLists {
    pub fn new(params: IvfParams, dimension: usize) -> Self {
        let lists = vec![Vec::new(); params.nlist];
        Self {
            params,
            dimension,
            centroids: None,
            lists,
        }
    }

    /// Fresh, empty lists sharing this index's parameters and centroids.
    pub fn empty_like(&self) -> Self {
        Self {
            params: self.params.clone(),
            dimension: self.dimension,
            centroids: self.centroids.clone(),
            lists: vec![Vec::new(); self.params.nlist],
        }
    }

    pub fn is_trained(&self) -> bool {
        self.centroids.is_some()
    }

    pub fn centroids(&self) -> Option<&[f32]> {
        self.centroids.as_deref()
    }

    /// Install centroids computed elsewhere (e.g. read back from disk).
    pub fn set_centroids(&mut self, centroids: Vec<f32>) {
        self.centroids = Some(centroids);
    }

    /// Run k-means over `samples` and keep the resulting centroids.
    ///
    /// The caller guarantees at least `nlist` samples of the right dimension.
    pub fn train(&mut self, samples: &[Vec<f32>]) -> usize {
        let (centroids, iterations) = kmeans(
            samples,
            self.params.nlist,
            self.dimension,
            self.params.max_iterations,
        );
        self.centroids = Some(centroids);
        iterations
    }

    /// Record that storage row `row` holds `vector`.
    pub fn assign(&mut self, row: usize, vector: &[f32]) {
        if let Some(centroids) = &self.centroids {
            let list = nearest(centroids, self.dimension, vector);
            self.lists[list].push(row);
        }
    }

    /// Rows in the `nprobe` partitions closest to `query`.
    pub fn candidates(&self, query: &[f32]) -> Vec<usize> {
        let Some(centroids) = &self.centroids else {
            return Vec::new();
        };

        let mut by_distance: Vec<(usize, f32)> = centroids
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(i, c)| (i, squared_l2(c, query)))
            .collect();
        by_distance.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let nprobe = self.params.nprobe.clamp(1, self.params.nlist);
        by_distance
            .iter()
            .take(nprobe)
            .flat_map(|(list, _)| self.lists[*list].iter().copied())
            .collect()
    }

    #[cfg(test)]
    pub fn list_sizes(&self) -> Vec<usize> {
        self.lists.iter().map(Vec::len).collect()
    }
}

fn nearest(centroids: &[f32], dimension: usize, vector: &[f32]) -> usize {
    centroids
        .chunks_exact(dimension)
        .enumerate()
        .map(|(i, c)| (i, squared_l2(c, vector)))
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
        .map_or(0, |(i, _)| i)
}

/// Lloyd's k-means with evenly spaced seeding so training is reproducible.
///
/// Returns the centroids and the number of iterations run. A cluster that
/// loses all its members keeps its previous centroid.
fn kmeans(
    samples: &[Vec<f32>],
    k: usize,
    dimension: usize,
    max_iterations: usize,
) -> (Vec<f32>, usize) {
    let n = samples.len();
    let mut centroids: Vec<f32> = (0..k)
        .flat_map(|i| samples[i * n / k].iter().copied())
        .collect();
    let mut assignments = vec![usize::MAX; n];
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;

        let mut changed = false;
        for (sample, assignment) in samples.iter().zip(assignments.iter_mut()) {
            let cluster = nearest(&centroids, dimension, sample);
            if *assignment != cluster {
                *assignment = cluster;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![0.0f64; k * dimension];
        let mut counts = vec![0usize; k];
        for (sample, &cluster) in samples.iter().zip(&assignments) {
            counts[cluster] += 1;
            let sum = &mut sums[cluster * dimension..(cluster + 1) * dimension];
            for (s, x) in sum.iter_mut().zip(sample) {
                *s += f64::from(*x);
            }
        }
        for cluster in 0..k {
            if counts[cluster] == 0 {
                continue;
            }
            let range = cluster * dimension..(cluster + 1) * dimension;
            for (c, s) in centroids[range.clone()].iter_mut().zip(&sums[range]) {
                *c = (*s / counts[cluster] as f64) as f32;
            }
        }
    }

    (centroids, iterations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.1],
            vec![10.0, 10.0],
            vec![0.1, 0.0],
            vec![10.1, 9.9],
            vec![0.0, 0.0],
            vec![9.9, 10.1],
        ]
    }

    #[test]
    fn test_kmeans_separates_blobs() {
        let (centroids, _) = kmeans(&two_blobs(), 2, 2, 25);
        let mut near_origin = 0;
        let mut near_ten = 0;
        for c in centroids.chunks_exact(2) {
            if squared_l2(c, &[0.0, 0.0]) < 1.0 {
                near_origin += 1;
            }
            if squared_l2(c, &[10.0, 10.0]) < 1.0 {
                near_ten += 1;
            }
        }
        assert_eq!((near_origin, near_ten), (1, 1));
    }

    #[test]
    fn test_kmeans_is_deterministic() {
        assert_eq!(kmeans(&two_blobs(), 2, 2, 25), kmeans(&two_blobs(), 2, 2, 25));
    }

    #[test]
    fn test_candidates_come_from_nearest_lists() {
        let mut lists = InvertedLists::new(
            IvfParams {
                nlist: 2,
                nprobe: 1,
                max_iterations: 25,
            },
            2,
        );
        assert!(lists.candidates(&[0.0, 0.0]).is_empty());

        lists.train(&two_blobs());
        for (row, v) in two_blobs().iter().enumerate() {
            lists.assign(row, v);
        }
        assert_eq!(lists.list_sizes().iter().sum::<usize>(), 6);

        let mut near = lists.candidates(&[0.05, 0.05]);
        near.sort_unstable();
        assert_eq!(near, vec![0, 2, 4]);
    }

    #[test]
    fn test_empty_like_keeps_centroids_drops_rows() {
        let mut lists = InvertedLists::new(IvfParams::new(2), 2);
        lists.train(&two_blobs());
        lists.assign(0, &[0.0, 0.0]);

        let fresh = lists.empty_like();
        assert!(fresh.is_trained());
        assert_eq!(fresh.list_sizes(), vec![0, 0]);
    }
}

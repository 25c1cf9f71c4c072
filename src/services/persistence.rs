//! Saving and loading a [`VectorStore`] as an index file plus a metadata file.
//!
//! The index file is a bincode-encoded, versioned [`IndexSnapshot`]. The
//! metadata file is a JSON [`StoreManifest`] that carries the VID map, the
//! VID counter, the embedding model identifier and a SHA-256 checksum of the
//! index file so a mismatched pair is caught on load.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::PersistenceError;
use crate::models::{IndexConfig, IndexVariant, MetadataRecord, Vid};
use crate::services::metadata::MetadataStore;
use crate::services::vector_index::{IndexSnapshot, VectorIndex};
use crate::services::vector_store::VectorStore;

/// Version written at the head of every index file.
pub const FORMAT_VERSION: u32 = 1;

/// Contents of the metadata file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreManifest {
    pub id_map: BTreeMap<Vid, MetadataRecord>,
    pub next_id: Vid,
    pub embedding_model: String,
    pub dimension: usize,
    pub index_variant: IndexVariant,
    /// Hex SHA-256 of the index file bytes
    pub index_checksum: String,
    pub saved_at: DateTime<Utc>,
}

/// The two serialized halves of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedState {
    pub index_bytes: Vec<u8>,
    pub manifest_bytes: Vec<u8>,
}

/// Where the file pair lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub index_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl StorePaths {
    pub fn new(index_path: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            metadata_path: metadata_path.into(),
        }
    }

    /// Paths from config, `None` unless both are set.
    pub fn from_config(config: &IndexConfig) -> Option<Self> {
        match (&config.index_path, &config.metadata_path) {
            (Some(index), Some(metadata)) => Some(Self::new(index, metadata)),
            _ => None,
        }
    }

    /// `true` when both files are present.
    pub fn exist(&self) -> bool {
        self.index_path.exists() && self.metadata_path.exists()
    }
}

/// Non-fatal conditions found while loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// The vectors were produced by a different model than the configured one.
    ModelMismatch { saved: String, configured: String },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadWarning::ModelMismatch { saved, configured } => write!(
                f,
                "index was built with embedding model '{}' but '{}' is configured",
                saved, configured
            ),
        }
    }
}

/// A store read back from disk.
#[derive(Debug)]
pub struct Loaded {
    pub store: VectorStore,
    pub warnings: Vec<LoadWarning>,
}

/// Serialize `store` into its index and manifest halves.
pub fn to_bytes(store: &VectorStore) -> Result<PersistedState, PersistenceError> {
    let snapshot = store.index().snapshot();
    let index_bytes = bincode::serialize(&(FORMAT_VERSION, &snapshot))
        .map_err(|e| PersistenceError::Encode(e.to_string()))?;

    let manifest = StoreManifest {
        id_map: store.metadata().clone().into_map(),
        next_id: snapshot.next_vid,
        embedding_model: store.embedding_model().to_string(),
        dimension: snapshot.dimension,
        index_variant: snapshot.variant,
        index_checksum: checksum(&index_bytes),
        saved_at: Utc::now(),
    };
    let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;

    Ok(PersistedState {
        index_bytes,
        manifest_bytes,
    })
}

/// Rebuild a store from its serialized halves.
///
/// A model identifier differing from `configured_model` is reported as a
/// warning, not an error. The loaded store keeps the saved identifier.
pub fn from_bytes(
    state: &PersistedState,
    configured_model: &str,
) -> Result<Loaded, PersistenceError> {
    let manifest: StoreManifest = serde_json::from_slice(&state.manifest_bytes)?;

    let actual = checksum(&state.index_bytes);
    if actual != manifest.index_checksum {
        return Err(PersistenceError::ChecksumMismatch {
            expected: manifest.index_checksum,
            actual,
        });
    }

    let version: u32 = bincode::deserialize(&state.index_bytes)
        .map_err(|e| PersistenceError::Decode(e.to_string()))?;
    if version != FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion(version));
    }
    let (_, snapshot): (u32, IndexSnapshot) = bincode::deserialize(&state.index_bytes)
        .map_err(|e| PersistenceError::Decode(e.to_string()))?;

    if snapshot.dimension != manifest.dimension {
        return Err(PersistenceError::Inconsistent(format!(
            "manifest dimension {} but index dimension {}",
            manifest.dimension, snapshot.dimension
        )));
    }
    if snapshot.next_vid != manifest.next_id {
        return Err(PersistenceError::Inconsistent(format!(
            "manifest next id {} but index next id {}",
            manifest.next_id, snapshot.next_vid
        )));
    }
    if snapshot.variant != manifest.index_variant {
        return Err(PersistenceError::Inconsistent(format!(
            "manifest says {} index but file holds {}",
            manifest.index_variant, snapshot.variant
        )));
    }

    let index = VectorIndex::from_snapshot(snapshot)?;

    let index_ids: BTreeSet<Vid> = index.ids().iter().copied().collect();
    let metadata_ids: BTreeSet<Vid> = manifest.id_map.keys().copied().collect();
    if index_ids != metadata_ids {
        return Err(PersistenceError::Inconsistent(format!(
            "{} vectors but {} metadata records, or ids disagree",
            index_ids.len(),
            metadata_ids.len()
        )));
    }

    let mut warnings = Vec::new();
    if manifest.embedding_model != configured_model {
        let warning = LoadWarning::ModelMismatch {
            saved: manifest.embedding_model.clone(),
            configured: configured_model.to_string(),
        };
        warn!("{}", warning);
        warnings.push(warning);
    }

    let store = VectorStore::from_parts(
        index,
        MetadataStore::from(manifest.id_map),
        manifest.embedding_model,
    )?;

    Ok(Loaded { store, warnings })
}

/// Write `store` to the file pair.
pub fn save(store: &VectorStore, paths: &StorePaths) -> Result<(), PersistenceError> {
    let state = to_bytes(store)?;
    write_atomic(&paths.index_path, &state.index_bytes)?;
    write_atomic(&paths.metadata_path, &state.manifest_bytes)?;
    info!(
        "saved {} vectors to {}",
        store.len(),
        paths.index_path.display()
    );
    Ok(())
}

/// Read the file pair, or `Ok(None)` if either file is missing.
pub fn load(
    paths: &StorePaths,
    configured_model: &str,
) -> Result<Option<Loaded>, PersistenceError> {
    if !paths.exist() {
        debug!(
            "no saved index at {} / {}",
            paths.index_path.display(),
            paths.metadata_path.display()
        );
        return Ok(None);
    }

    let state = PersistedState {
        index_bytes: std::fs::read(&paths.index_path)?,
        manifest_bytes: std::fs::read(&paths.metadata_path)?,
    };
    let loaded = from_bytes(&state, configured_model)?;
    info!(
        "loaded {} vectors from {}",
        loaded.store.len(),
        paths.index_path.display()
    );
    Ok(Some(loaded))
}

fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexError;

    fn store(model: &str) -> VectorStore {
        let mut store = VectorStore::new(VectorIndex::exact(3).unwrap(), model);
        let vectors = vec![
            vec![0.1, 0.2, 0.3],
            vec![1.0 / 3.0, f32::MIN_POSITIVE, -0.0],
            vec![0.5, -0.5, 0.7071068],
        ];
        let records = vec![
            MetadataRecord::new(1, 0, "first", 4).with_extra("year", 2021),
            MetadataRecord::new(1, 1, "second", 5),
            MetadataRecord::new(2, 0, "third", 6).with_extra("venue", "ACL"),
        ];
        store.insert(&vectors, records).unwrap();
        store
    }

    fn approximate_store() -> VectorStore {
        let index = VectorIndex::approximate(2, 2).unwrap();
        let mut store = VectorStore::new(index, "m");
        let samples = vec![vec![0.0, 0.0], vec![0.1, 0.0], vec![5.0, 5.0], vec![5.1, 5.0]];
        store.train(&samples).unwrap();
        let records = (0..4).map(|i| MetadataRecord::new(9, i, "x", 1)).collect();
        store.insert(&samples, records).unwrap();
        store
    }

    fn bits(store: &VectorStore, vid: Vid) -> Vec<u32> {
        let vector = store.index().reconstruct(vid).unwrap();
        vector.iter().map(|x| x.to_bits()).collect()
    }

    fn assert_same_content(a: &VectorStore, b: &VectorStore) {
        assert_eq!(a.index().ids(), b.index().ids());
        for &vid in a.index().ids() {
            assert_eq!(bits(a, vid), bits(b, vid));
        }
        assert_eq!(a.metadata(), b.metadata());
        assert_eq!(a.embedding_model(), b.embedding_model());
        assert_eq!(a.statistics(), b.statistics());
    }

    #[test]
    fn test_bytes_round_trip_is_exact() {
        let original = store("model-a");
        let state = to_bytes(&original).unwrap();
        let loaded = from_bytes(&state, "model-a").unwrap();

        assert!(loaded.warnings.is_empty());
        assert_same_content(&original, &loaded.store);
    }

    #[test]
    fn test_extreme_float_metadata_survives_round_trip() {
        let mut original = VectorStore::new(VectorIndex::exact(3).unwrap(), "m");
        let records = vec![
            MetadataRecord::new(1, 0, "tiny", 1).with_extra("score", 1.0715660391465826e-75),
            MetadataRecord::new(1, 1, "negative", 1).with_extra("score", -1.81996730402717e-179),
            MetadataRecord::new(2, 0, "huge", 1).with_extra("score", -1.603964615428183e+143),
        ];
        let vectors = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]];
        original.insert(&vectors, records).unwrap();

        let loaded = from_bytes(&to_bytes(&original).unwrap(), "m").unwrap().store;
        assert_eq!(loaded.metadata(), original.metadata());
        assert_eq!(
            loaded.metadata().get(0).unwrap().extra["score"].as_f64(),
            Some(1.0715660391465826e-75)
        );
    }

    #[test]
    fn test_round_trip_after_deletion_keeps_counter() {
        let mut original = store("model-a");
        original.delete_by_ids(&[0], false).unwrap();

        let loaded = from_bytes(&to_bytes(&original).unwrap(), "model-a").unwrap();
        assert_same_content(&original, &loaded.store);
        assert_eq!(loaded.store.statistics().next_vid, 3);
    }

    #[test]
    fn test_approximate_round_trip_stays_searchable() {
        let original = approximate_store();
        let loaded = from_bytes(&to_bytes(&original).unwrap(), "m").unwrap().store;

        assert_same_content(&original, &loaded);
        assert!(loaded.index().is_trained());
        assert_eq!(
            original.search(&[5.0, 5.0], 2).unwrap(),
            loaded.search(&[5.0, 5.0], 2).unwrap()
        );
    }

    #[test]
    fn test_model_mismatch_is_a_warning() {
        let state = to_bytes(&store("model-a")).unwrap();
        let loaded = from_bytes(&state, "model-b").unwrap();

        assert_eq!(
            loaded.warnings,
            vec![LoadWarning::ModelMismatch {
                saved: "model-a".to_string(),
                configured: "model-b".to_string(),
            }]
        );
        assert_eq!(loaded.store.embedding_model(), "model-a");
        assert_eq!(loaded.store.len(), 3);
    }

    #[test]
    fn test_corrupt_index_fails_checksum() {
        let mut state = to_bytes(&store("m")).unwrap();
        let last = state.index_bytes.len() - 1;
        state.index_bytes[last] ^= 0xFF;

        assert!(matches!(
            from_bytes(&state, "m"),
            Err(PersistenceError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_mismatched_pair_is_rejected() {
        let a = to_bytes(&store("m")).unwrap();
        let b = to_bytes(&approximate_store()).unwrap();
        let mixed = PersistedState {
            index_bytes: a.index_bytes,
            manifest_bytes: b.manifest_bytes,
        };
        assert!(from_bytes(&mixed, "m").is_err());
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let snapshot = store("m").index().snapshot();
        let index_bytes = bincode::serialize(&(FORMAT_VERSION + 1, &snapshot)).unwrap();

        let mut manifest: StoreManifest =
            serde_json::from_slice(&to_bytes(&store("m")).unwrap().manifest_bytes).unwrap();
        manifest.index_checksum = checksum(&index_bytes);
        let state = PersistedState {
            index_bytes,
            manifest_bytes: serde_json::to_vec(&manifest).unwrap(),
        };

        assert!(matches!(
            from_bytes(&state, "m"),
            Err(PersistenceError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_inconsistent_snapshot_is_an_index_error() {
        let mut snapshot = store("m").index().snapshot();
        snapshot.data.pop();
        let index_bytes = bincode::serialize(&(FORMAT_VERSION, &snapshot)).unwrap();

        let mut manifest: StoreManifest =
            serde_json::from_slice(&to_bytes(&store("m")).unwrap().manifest_bytes).unwrap();
        manifest.index_checksum = checksum(&index_bytes);
        let state = PersistedState {
            index_bytes,
            manifest_bytes: serde_json::to_vec(&manifest).unwrap(),
        };

        assert!(matches!(
            from_bytes(&state, "m"),
            Err(PersistenceError::Index(IndexError::InvalidSnapshot(_)))
        ));
    }

    #[test]
    fn test_metadata_keys_must_match_index() {
        let state = to_bytes(&store("m")).unwrap();
        let mut manifest: StoreManifest = serde_json::from_slice(&state.manifest_bytes).unwrap();
        manifest.id_map.remove(&1);
        let state = PersistedState {
            index_bytes: state.index_bytes,
            manifest_bytes: serde_json::to_vec(&manifest).unwrap(),
        };

        assert!(matches!(
            from_bytes(&state, "m"),
            Err(PersistenceError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StorePaths::new(
            dir.path().join("data").join("index.bin"),
            dir.path().join("data").join("metadata.json"),
        );
        let original = store("m");

        save(&original, &paths).unwrap();
        assert!(paths.exist());

        let loaded = load(&paths, "m").unwrap().unwrap();
        assert_same_content(&original, &loaded.store);
    }

    #[test]
    fn test_missing_file_means_fresh_start() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StorePaths::new(
            dir.path().join("index.bin"),
            dir.path().join("metadata.json"),
        );
        assert!(load(&paths, "m").unwrap().is_none());

        save(&store("m"), &paths).unwrap();
        std::fs::remove_file(&paths.metadata_path).unwrap();
        assert!(load(&paths, "m").unwrap().is_none());
    }

    #[test]
    fn test_manifest_is_readable_json() {
        let state = to_bytes(&store("model-a")).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&state.manifest_bytes).unwrap();
        assert_eq!(value["embedding_model"], "model-a");
        assert_eq!(value["dimension"], 3);
        assert_eq!(value["next_id"], 3);
        assert_eq!(value["id_map"]["2"]["extra"]["venue"], "ACL");
    }
}

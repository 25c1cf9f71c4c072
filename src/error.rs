//! Error types for the paper vector core.

use thiserror::Error;

use crate::models::Vid;

/// Errors related to chunking.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("chunk size must be at least 1")]
    InvalidChunkSize,

    #[error("overlap {overlap} must be smaller than chunk size {chunk_size}")]
    InvalidOverlap { chunk_size: usize, overlap: usize },
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding server: {0}")]
    ConnectionError(String),

    #[error("embedding server error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding timeout")]
    Timeout,

    #[error("embedding backend error: {0}")]
    Backend(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors raised by the vector index and the store built on top of it.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid dimension: {0}")]
    InvalidDimension(usize),

    #[error("invalid cluster count: {0}")]
    InvalidClusterCount(usize),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("approximate index must be trained before vectors are added")]
    NotTrained,

    #[error("need at least {required} training vectors, got {actual}")]
    InsufficientTrainingData { required: usize, actual: usize },

    #[error("vector {0} not found")]
    NotFound(Vid),

    #[error("got {vectors} vectors but {records} metadata records")]
    ShapeMismatch { vectors: usize, records: usize },

    #[error("{vectors} stored vectors but {records} metadata records, or their ids disagree")]
    MetadataMismatch { vectors: usize, records: usize },

    #[error("invalid index snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Errors related to saving and loading the index file pair.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index encode error: {0}")]
    Encode(String),

    #[error("index decode error: {0}")]
    Decode(String),

    #[error("metadata file error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported index format version {0}")]
    UnsupportedVersion(u32),

    #[error("index checksum mismatch: manifest has {expected}, index file hashes to {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("inconsistent saved state: {0}")]
    Inconsistent(String),

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors surfaced by the embedding pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("chunking error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("got {texts} texts but {records} metadata records")]
    ShapeMismatch { texts: usize, records: usize },

    #[error("no persistence paths configured")]
    NoStoragePaths,
}

mod chunk;
mod config;
mod document;
mod search;

pub use chunk::{Chunk, ChunkMode};
pub use config::{
    ChunkingConfig, Config, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_EMBEDDING_DIMENSION,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_URL, EmbeddingConfig, IndexConfig, LoggingConfig,
    PipelineConfig,
};
pub use document::{Document, MetadataRecord};
pub use search::{BatchStats, IndexStatistics, IndexVariant, SearchHit, similarity_from_distance};

/// Vector identifier assigned by the index at insertion time.
pub type Vid = u64;

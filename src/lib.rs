//! Chunking, embedding and nearest-neighbour search over research-paper text.
//!
//! [`EmbeddingPipeline`](services::EmbeddingPipeline) is the entry point: it
//! splits papers into overlapping chunks, embeds them through a pluggable
//! [`EmbeddingProvider`](services::EmbeddingProvider), stores the vectors in
//! an exact or approximate [`VectorIndex`](services::VectorIndex) alongside
//! per-chunk metadata, and persists both as a file pair.

pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use error::{
    ChunkError, ConfigError, EmbeddingError, IndexError, PersistenceError, PipelineError,
};
pub use models::{Config, Document, MetadataRecord, SearchHit, Vid};
pub use services::{EmbeddingPipeline, EmbeddingProvider};

mod chunker;
mod embedding;
mod gateway;
mod metadata;
pub mod persistence;
mod pipeline;
pub mod vector_index;
mod vector_store;

pub use chunker::{TextChunker, chunk_text, count_tokens, tokenize};
pub use embedding::{EmbeddingProvider, HealthResponse, HttpEmbeddingClient};
pub use gateway::EmbeddingGateway;
pub use metadata::MetadataStore;
pub use persistence::{LoadWarning, Loaded, PersistedState, StorePaths};
pub use pipeline::EmbeddingPipeline;
pub use vector_index::{IndexSnapshot, Rebuilt, VectorIndex};
pub use vector_store::{StoredHit, VectorStore};

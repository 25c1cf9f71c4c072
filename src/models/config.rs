use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::chunk::ChunkMode;
use super::search::IndexVariant;
use crate::error::ConfigError;

pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11411";
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;
pub const DEFAULT_CHUNK_SIZE: u32 = 512;
pub const DEFAULT_CHUNK_OVERLAP: u32 = 50;

const APP_DIR: &str = "paper-vectors";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR).join("config.toml"))
    }

    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join(APP_DIR))
    }

    pub fn load() -> Result<Self, ConfigError> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            return Self::load_from(&path);
        }
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be positive".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.batch_size must be positive".to_string(),
            ));
        }
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "chunking.chunk_size must be positive".to_string(),
            ));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.index.nlist == 0 {
            return Err(ConfigError::ValidationError(
                "index.nlist must be positive".to_string(),
            ));
        }
        if self.index.nprobe == 0 {
            return Err(ConfigError::ValidationError(
                "index.nprobe must be positive".to_string(),
            ));
        }
        if self.pipeline.document_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.document_batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Identifier of the embedding model; recorded with saved indexes
    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub show_progress: bool,
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_batch_size() -> u32 {
    32
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_timeout() -> u64 {
    120
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_dimension(),
            batch_size: default_batch_size(),
            url: default_embedding_url(),
            timeout_secs: default_timeout(),
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub variant: IndexVariant,

    /// Partition count for the approximate variant
    #[serde(default = "default_nlist")]
    pub nlist: u32,

    /// Partitions scanned per query for the approximate variant
    #[serde(default = "default_nprobe")]
    pub nprobe: u32,

    #[serde(default = "default_kmeans_iterations")]
    pub kmeans_iterations: u32,

    #[serde(default = "default_index_path")]
    pub index_path: Option<PathBuf>,

    #[serde(default = "default_metadata_path")]
    pub metadata_path: Option<PathBuf>,

    /// Renumber surviving vectors densely when deleting
    #[serde(default)]
    pub compact_on_delete: bool,
}

fn default_nlist() -> u32 {
    100
}

fn default_nprobe() -> u32 {
    8
}

fn default_kmeans_iterations() -> u32 {
    25
}

fn default_index_path() -> Option<PathBuf> {
    Config::data_dir().map(|p| p.join("index.bin"))
}

fn default_metadata_path() -> Option<PathBuf> {
    Config::data_dir().map(|p| p.join("metadata.json"))
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            variant: IndexVariant::default(),
            nlist: default_nlist(),
            nprobe: default_nprobe(),
            kmeans_iterations: default_kmeans_iterations(),
            index_path: default_index_path(),
            metadata_path: default_metadata_path(),
            compact_on_delete: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,

    #[serde(default = "default_preview_chars")]
    pub preview_chars: u32,

    #[serde(default)]
    pub mode: ChunkMode,
}

fn default_chunk_size() -> u32 {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> u32 {
    DEFAULT_CHUNK_OVERLAP
}

fn default_preview_chars() -> u32 {
    200
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            preview_chars: default_preview_chars(),
            mode: ChunkMode::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_document_batch_size")]
    pub document_batch_size: u32,

    #[serde(default = "default_save_after_batch")]
    pub save_after_batch: bool,
}

fn default_document_batch_size() -> u32 {
    5
}

fn default_save_after_batch() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            document_batch_size: default_document_batch_size(),
            save_after_batch: default_save_after_batch(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

//! Batched access to an [`EmbeddingProvider`].

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;
use crate::services::embedding::EmbeddingProvider;
use crate::services::vector_index::l2_normalize;
use crate::utils::normalize_for_embedding;

/// Splits work into provider-sized groups, checks each group's shape and
/// L2-normalizes every vector it returns.
#[derive(Clone)]
pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    show_progress: bool,
}

impl EmbeddingGateway {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            show_progress: false,
        }
    }

    pub fn from_config(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self::new(provider, config.batch_size as usize).with_progress(config.show_progress)
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Embed `texts` in groups of at most `batch_size`.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let expected_dim = self.provider.dimension();
        let pb = self.progress_bar(texts.len());
        let mut vectors = Vec::with_capacity(texts.len());

        for group in texts.chunks(self.batch_size) {
            debug!("embedding group of {} texts", group.len());
            let embedded = self.provider.embed(group).await?;
            if embedded.len() != group.len() {
                pb.abandon();
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    group.len(),
                    embedded.len()
                )));
            }

            for mut vector in embedded {
                if vector.len() != expected_dim {
                    pb.abandon();
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: expected_dim,
                        actual: vector.len(),
                    });
                }
                l2_normalize(&mut vector);
                vectors.push(vector);
            }
            pb.inc(group.len() as u64);
        }

        pb.finish_and_clear();
        Ok(vectors)
    }

    /// Normalize `query` the same way document chunks are and embed it.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = normalize_for_embedding(query);
        let mut vectors = self.embed_batch(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding for query".to_string()))
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total as u64);
        let template =
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})";
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

//! Chunk, embed and index papers; search them by free text.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::{EmbeddingError, PipelineError};
use crate::models::{
    BatchStats, ChunkMode, Config, Document, IndexStatistics, MetadataRecord, SearchHit, Vid,
    similarity_from_distance,
};
use crate::services::chunker::TextChunker;
use crate::services::embedding::EmbeddingProvider;
use crate::services::gateway::EmbeddingGateway;
use crate::services::persistence::{self, LoadWarning, StorePaths};
use crate::services::vector_store::{StoredHit, VectorStore};
use crate::utils::normalize_for_embedding;

/// One document's embedded chunks, ready to insert.
struct Prepared {
    vectors: Vec<Vec<f32>>,
    records: Vec<MetadataRecord>,
}

/// Orchestrates chunking, embedding and indexing over a shared [`VectorStore`].
///
/// The store sits behind a reader-writer lock: searches share it, inserts,
/// deletions and clears take it exclusively. Embedding work never holds the
/// lock.
pub struct EmbeddingPipeline {
    gateway: EmbeddingGateway,
    store: Arc<RwLock<VectorStore>>,
    chunker: TextChunker,
    mode: ChunkMode,
    preview_chars: usize,
    compact_on_delete: bool,
    document_batch_size: usize,
    save_after_batch: bool,
    paths: Option<StorePaths>,
    cancel: Arc<AtomicBool>,
    load_warnings: Vec<LoadWarning>,
}

impl EmbeddingPipeline {
    /// Pipeline over a fresh, empty store.
    pub fn new(
        config: &Config,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, PipelineError> {
        let gateway = EmbeddingGateway::from_config(provider, &config.embedding);
        check_dimension(config, &gateway)?;
        Self::fresh(config, gateway)
    }

    fn fresh(config: &Config, gateway: EmbeddingGateway) -> Result<Self, PipelineError> {
        let store =
            VectorStore::from_config(&config.index, gateway.dimension(), gateway.model_name())?;
        info!(
            "created {} index (dimension {}, model {})",
            config.index.variant,
            gateway.dimension(),
            gateway.model_name()
        );
        Self::with_store(config, gateway, store, Vec::new())
    }

    /// Pipeline over the store saved at the configured paths, or a fresh one
    /// when nothing has been saved yet.
    pub fn open(
        config: &Config,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, PipelineError> {
        let Some(paths) = StorePaths::from_config(&config.index) else {
            return Self::new(config, provider);
        };

        let gateway = EmbeddingGateway::from_config(provider, &config.embedding);
        check_dimension(config, &gateway)?;

        match persistence::load(&paths, gateway.model_name())? {
            Some(loaded) => {
                let dimension = loaded.store.index().dimension();
                if dimension != gateway.dimension() {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: dimension,
                        actual: gateway.dimension(),
                    }
                    .into());
                }
                if loaded.store.index().variant() != config.index.variant {
                    warn!(
                        "saved index is {} but {} is configured; keeping the saved variant",
                        loaded.store.index().variant(),
                        config.index.variant
                    );
                }
                Self::with_store(config, gateway, loaded.store, loaded.warnings)
            }
            None => {
                info!("no existing index at {}, starting fresh", paths.index_path.display());
                Self::fresh(config, gateway)
            }
        }
    }

    fn with_store(
        config: &Config,
        gateway: EmbeddingGateway,
        store: VectorStore,
        load_warnings: Vec<LoadWarning>,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            gateway,
            store: Arc::new(RwLock::new(store)),
            chunker: TextChunker::from_config(&config.chunking)?,
            mode: config.chunking.mode,
            preview_chars: config.chunking.preview_chars as usize,
            compact_on_delete: config.index.compact_on_delete,
            document_batch_size: config.pipeline.document_batch_size.max(1) as usize,
            save_after_batch: config.pipeline.save_after_batch,
            paths: StorePaths::from_config(&config.index),
            cancel: Arc::new(AtomicBool::new(false)),
            load_warnings,
        })
    }

    /// Shared handle to the underlying store.
    pub fn store(&self) -> Arc<RwLock<VectorStore>> {
        Arc::clone(&self.store)
    }

    /// Warnings raised when the store was loaded by [`open`](Self::open).
    pub fn load_warnings(&self) -> &[LoadWarning] {
        &self.load_warnings
    }

    /// Flag checked between documents by batched ingestion. Set it to stop early.
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Chunk, embed and store one paper. Returns the number of chunks stored.
    ///
    /// Either every chunk of the paper is stored or none is.
    pub async fn process_document(
        &self,
        paper_id: i64,
        text: &str,
        extra_metadata: &BTreeMap<String, Value>,
    ) -> Result<usize, PipelineError> {
        let prepared = self.prepare(paper_id, text, extra_metadata).await?;
        self.commit(paper_id, prepared).await
    }

    async fn prepare(
        &self,
        paper_id: i64,
        text: &str,
        extra_metadata: &BTreeMap<String, Value>,
    ) -> Result<Prepared, PipelineError> {
        let normalized = normalize_for_embedding(text);
        let chunks = self.chunker.chunk(&normalized, self.mode);
        if chunks.is_empty() {
            warn!("paper {} produced no chunks", paper_id);
            return Ok(Prepared {
                vectors: Vec::new(),
                records: Vec::new(),
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.gateway.embed_batch(&texts).await?;
        let records = chunks
            .iter()
            .map(|chunk| {
                MetadataRecord::from_chunk(paper_id, chunk, self.preview_chars, extra_metadata)
            })
            .collect();

        debug!("paper {} embedded into {} chunks", paper_id, chunks.len());
        Ok(Prepared { vectors, records })
    }

    async fn commit(&self, paper_id: i64, prepared: Prepared) -> Result<usize, PipelineError> {
        if prepared.vectors.is_empty() {
            return Ok(0);
        }
        let mut store = self.store.write().await;
        let vids = store.insert(&prepared.vectors, prepared.records)?;
        debug!("stored paper {} as vectors {:?}", paper_id, vids);
        Ok(vids.len())
    }

    /// Ingest `documents` in groups of `batch_size`, isolating failures per document.
    ///
    /// Documents in a group are chunked and embedded concurrently, then stored
    /// one at a time in input order. Cancellation is checked before each store,
    /// so a document is never half-stored. When configured, the store is saved
    /// once the run ends.
    pub async fn process_documents_batched(
        &self,
        documents: &[Document],
        batch_size: usize,
    ) -> Result<BatchStats, PipelineError> {
        let batch_size = batch_size.max(1);
        let mut stats = BatchStats {
            total: documents.len(),
            ..Default::default()
        };

        info!(
            "processing {} documents in groups of {}",
            documents.len(),
            batch_size
        );

        'groups: for (group_no, group) in documents.chunks(batch_size).enumerate() {
            if self.is_cancelled() {
                stats.cancelled = true;
                break;
            }

            let prepared = join_all(
                group
                    .iter()
                    .map(|doc| self.prepare(doc.paper_id, &doc.text, &doc.metadata)),
            )
            .await;

            for (doc, result) in group.iter().zip(prepared) {
                if self.is_cancelled() {
                    stats.cancelled = true;
                    break 'groups;
                }

                let outcome = match result {
                    Ok(prepared) => self.commit(doc.paper_id, prepared).await,
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(0) => stats.failed += 1,
                    Ok(chunks) => {
                        stats.processed += 1;
                        stats.total_chunks += chunks;
                    }
                    Err(e) => {
                        error!("failed to process paper {}: {}", doc.paper_id, e);
                        stats.failed += 1;
                    }
                }
            }

            debug!(
                "group {} done: {} processed, {} failed so far",
                group_no + 1,
                stats.processed,
                stats.failed
            );
        }

        if stats.cancelled {
            warn!(
                "batch cancelled after {} of {} documents",
                stats.processed + stats.failed,
                stats.total
            );
        }
        info!(
            "batch complete: {} processed, {} failed, {} chunks ({:.1} per document)",
            stats.processed,
            stats.failed,
            stats.total_chunks,
            stats.avg_chunks_per_document()
        );

        if self.save_after_batch && stats.processed > 0 && self.paths.is_some() {
            self.save().await?;
        }

        Ok(stats)
    }

    /// Batched ingestion using the configured group size.
    pub async fn process_documents(
        &self,
        documents: &[Document],
    ) -> Result<BatchStats, PipelineError> {
        self.process_documents_batched(documents, self.document_batch_size)
            .await
    }

    /// Embed `texts` as-is and store them with the matching `records`.
    ///
    /// The shapes are checked before anything is embedded or stored.
    pub async fn add_documents(
        &self,
        texts: &[String],
        records: Vec<MetadataRecord>,
    ) -> Result<Vec<Vid>, PipelineError> {
        if texts.len() != records.len() {
            return Err(PipelineError::ShapeMismatch {
                texts: texts.len(),
                records: records.len(),
            });
        }

        let vectors = self.gateway.embed_batch(texts).await?;
        let mut store = self.store.write().await;
        Ok(store.insert(&vectors, records)?)
    }

    /// Train an approximate index on embeddings of `texts`. No-op for exact indexes.
    pub async fn train_from_texts(&self, texts: &[String]) -> Result<(), PipelineError> {
        let normalized: Vec<String> = texts.iter().map(|t| normalize_for_embedding(t)).collect();
        let vectors = self.gateway.embed_batch(&normalized).await?;
        let mut store = self.store.write().await;
        store.train(&vectors)?;
        Ok(())
    }

    /// The `top_k` chunks most similar to `query`.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, PipelineError> {
        let vector = self.gateway.embed_query(query).await?;
        let store = self.store.read().await;
        let hits = store.search(&vector, top_k)?;
        debug!("query returned {} hits", hits.len());
        Ok(hits.into_iter().map(into_search_hit).collect())
    }

    /// Search for several queries, embedding them in one batch.
    pub async fn batch_search(
        &self,
        queries: &[String],
        top_k: usize,
    ) -> Result<Vec<Vec<SearchHit>>, PipelineError> {
        let normalized: Vec<String> = queries.iter().map(|q| normalize_for_embedding(q)).collect();
        let vectors = self.gateway.embed_batch(&normalized).await?;

        let store = self.store.read().await;
        vectors
            .iter()
            .map(|vector| -> Result<Vec<SearchHit>, PipelineError> {
                Ok(store
                    .search(vector, top_k)?
                    .into_iter()
                    .map(into_search_hit)
                    .collect())
            })
            .collect()
    }

    /// Remove every chunk of `paper_id`. Returns how many vectors were removed.
    pub async fn delete_paper(&self, paper_id: i64) -> Result<usize, PipelineError> {
        let mut store = self.store.write().await;
        let removed = store.delete_paper(paper_id, self.compact_on_delete)?;
        info!("deleted paper {} ({} vectors)", paper_id, removed);
        Ok(removed)
    }

    /// Remove specific vectors. Unknown VIDs are ignored.
    pub async fn delete_vectors(&self, vids: &[Vid]) -> Result<usize, PipelineError> {
        let mut store = self.store.write().await;
        Ok(store.delete_by_ids(vids, self.compact_on_delete)?)
    }

    pub async fn clear(&self) {
        self.store.write().await.clear();
    }

    /// Write the store to the configured file pair.
    pub async fn save(&self) -> Result<(), PipelineError> {
        let paths = self.paths.as_ref().ok_or(PipelineError::NoStoragePaths)?;
        let store = self.store.read().await;
        persistence::save(&store, paths)?;
        Ok(())
    }

    pub async fn get_statistics(&self) -> IndexStatistics {
        self.store.read().await.statistics()
    }
}

fn check_dimension(config: &Config, gateway: &EmbeddingGateway) -> Result<(), PipelineError> {
    let configured = config.embedding.dimension as usize;
    if gateway.dimension() != configured {
        return Err(EmbeddingError::DimensionMismatch {
            expected: configured,
            actual: gateway.dimension(),
        }
        .into());
    }
    Ok(())
}

fn into_search_hit(hit: StoredHit) -> SearchHit {
    let StoredHit {
        vid,
        distance,
        record,
    } = hit;
    SearchHit {
        vid,
        paper_id: record.paper_id,
        chunk_sequence_id: record.chunk_sequence_id,
        text_preview: record.text_preview,
        token_count: record.token_count,
        extra: record.extra,
        similarity: Some(similarity_from_distance(distance)),
        relevance: None,
    }
}

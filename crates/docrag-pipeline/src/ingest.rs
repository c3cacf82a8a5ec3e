//! Single-document ingestion: extension check, dedup, extraction, chunking,
//! embedding and one bulk insert-if-absent.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use docrag_core::chunker::TokenChunker;
use docrag_core::error::{Error, Result};
use docrag_core::extract::{extract_text, FileKind};
use docrag_core::traits::{ByteSource, Embedder, IndexStore};
use docrag_core::types::{
    ChunkFailurePolicy, ChunkMetadata, IndexRow, IngestStatus, InsertOutcome, SkipReason,
    StoreUnavailablePolicy,
};

use crate::dedup::DedupGuard;
use crate::embed_blocking;

pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub on_chunk_failure: ChunkFailurePolicy,
    pub on_store_unavailable: StoreUnavailablePolicy,
    /// Chunks per embedder call.
    pub embed_batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            on_chunk_failure: ChunkFailurePolicy::default(),
            on_store_unavailable: StoreUnavailablePolicy::default(),
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }
}

pub struct IngestionPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn IndexStore>,
    chunker: Arc<TokenChunker>,
    dedup: DedupGuard,
    on_chunk_failure: ChunkFailurePolicy,
    batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn IndexStore>,
        chunker: TokenChunker,
        options: IngestOptions,
    ) -> Result<Self> {
        if embedder.dim() != store.dim() {
            return Err(Error::DimensionMismatch { expected: store.dim(), got: embedder.dim() });
        }
        if options.embed_batch_size == 0 {
            return Err(Error::InvalidConfig("embed_batch_size must be greater than zero".into()));
        }
        let chunk_size = chunker.config().chunk_size;
        if chunk_size > embedder.max_len() {
            warn!(
                "chunk_size {} exceeds {} max input length {}; chunk tails are not embedded",
                chunk_size,
                embedder.model_id(),
                embedder.max_len()
            );
        }
        let dedup = DedupGuard::new(store.clone(), options.on_store_unavailable);
        Ok(Self {
            embedder,
            store,
            chunker: Arc::new(chunker),
            dedup,
            on_chunk_failure: options.on_chunk_failure,
            batch_size: options.embed_batch_size,
        })
    }

    pub fn dedup(&self) -> &DedupGuard {
        &self.dedup
    }

    /// Ingest one document. Skips are `Ok`; extraction, embedding, chunk
    /// construction (under `fail_document`) and store-write failures are `Err`.
    pub async fn ingest(
        &self,
        source: &dyn ByteSource,
        filename: &str,
        filepath: &str,
    ) -> Result<IngestStatus> {
        let Some(kind) = FileKind::from_filename(filename) else {
            info!("Skipping {}: unsupported file type", filename);
            return Ok(IngestStatus::Skipped(SkipReason::UnsupportedFileType));
        };

        if self.dedup.exists(filepath).await? {
            info!("Skipping {}: already processed", filepath);
            return Ok(IngestStatus::Skipped(SkipReason::AlreadyProcessed));
        }

        let bytes = source.read_all().await?;
        let chunker = self.chunker.clone();
        let chunks = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let text = extract_text(kind, &bytes)?;
            chunker.token_chunks(&text)
        })
        .await
        .map_err(|e| Error::Extraction(format!("extraction task failed: {e}")))??;
        debug!("{}: {} chunks", filename, chunks.len());

        if chunks.is_empty() {
            info!("{} produced no chunks", filepath);
            return Ok(IngestStatus::Processed { chunks: 0 });
        }

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let vectors = embed_blocking(self.embedder.clone(), batch.to_vec()).await?;
            if vectors.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            embeddings.extend(vectors);
        }

        let rows = self.build_rows(filename, filepath, chunks, embeddings)?;
        match self.store.insert_if_absent(filepath, &rows).await? {
            InsertOutcome::Inserted(n) => {
                info!("Indexed {} ({} chunks)", filepath, n);
                Ok(IngestStatus::Processed { chunks: n })
            }
            InsertOutcome::AlreadyPresent => {
                info!("Skipping {}: indexed concurrently", filepath);
                Ok(IngestStatus::Skipped(SkipReason::AlreadyProcessed))
            }
        }
    }

    fn build_rows(
        &self,
        filename: &str,
        filepath: &str,
        chunks: Vec<String>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Vec<IndexRow>> {
        let dim = self.store.dim();
        let mut rows = Vec::with_capacity(chunks.len());
        for (chunk_id, (text, embedding)) in chunks.into_iter().zip(embeddings).enumerate() {
            match check_chunk(&text, &embedding, dim) {
                Ok(()) => rows.push(IndexRow {
                    text,
                    metadata: ChunkMetadata {
                        filename: filename.to_string(),
                        filepath: filepath.to_string(),
                        chunk_id,
                        doc_id: Uuid::new_v4().to_string(),
                    },
                    embedding,
                }),
                Err(reason) => match self.on_chunk_failure {
                    ChunkFailurePolicy::FailDocument => {
                        return Err(Error::ChunkConstruction { chunk_id, reason })
                    }
                    ChunkFailurePolicy::SkipChunk => {
                        warn!("Dropping chunk {} of {}: {}", chunk_id, filepath, reason)
                    }
                },
            }
        }
        Ok(rows)
    }
}

fn check_chunk(text: &str, embedding: &[f32], dim: usize) -> std::result::Result<(), String> {
    if text.trim().is_empty() {
        return Err("blank text".into());
    }
    if embedding.len() != dim {
        return Err(format!("embedding width {} != {}", embedding.len(), dim));
    }
    if embedding.iter().any(|x| !x.is_finite()) {
        return Err("embedding has non-finite values".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_checks() {
        assert!(check_chunk("text", &[0.1, 0.2], 2).is_ok());
        assert_eq!(check_chunk("  \n", &[0.1, 0.2], 2).unwrap_err(), "blank text");
        assert!(check_chunk("text", &[0.1], 2).unwrap_err().contains("width"));
        assert!(check_chunk("text", &[f32::NAN, 0.0], 2).unwrap_err().contains("non-finite"));
    }
}

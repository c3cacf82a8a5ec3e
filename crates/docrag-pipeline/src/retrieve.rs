use std::sync::Arc;
use tracing::{debug, warn};

use docrag_core::error::{Error, Result};
use docrag_core::traits::{Embedder, IndexStore};
use docrag_core::types::{IndexedFile, ScoredChunk, StoreUnavailablePolicy};

use crate::embed_blocking;

pub struct RetrievalPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn IndexStore>,
    on_store_unavailable: StoreUnavailablePolicy,
}

impl RetrievalPipeline {
    /// The embedder must be the one used at ingestion time; only its width
    /// can be checked here.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn IndexStore>,
        on_store_unavailable: StoreUnavailablePolicy,
    ) -> Result<Self> {
        if embedder.dim() != store.dim() {
            return Err(Error::DimensionMismatch { expected: store.dim(), got: embedder.dim() });
        }
        Ok(Self { embedder, store, on_store_unavailable })
    }

    /// Up to `top_k` chunks ranked by descending similarity to `query`.
    /// A blank query is rejected before the embedder or store is touched.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        if query.trim().is_empty() {
            return Err(Error::MissingQuery);
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let mut vectors = embed_blocking(self.embedder.clone(), vec![query.to_string()]).await?;
        let vector = vectors.pop().ok_or_else(|| Error::Embedding("no embedding returned for query".into()))?;
        if vector.len() != self.store.dim() {
            return Err(Error::DimensionMismatch { expected: self.store.dim(), got: vector.len() });
        }
        let mut hits = self.store.nearest_neighbors(&vector, top_k).await?;
        hits.truncate(top_k);
        debug!("search '{}' -> {} hits", query, hits.len());
        Ok(hits.into_iter().map(ScoredChunk::from).collect())
    }

    /// Distinct indexed files ordered by filename. Under `fail_open` a store
    /// failure yields an empty listing.
    pub async fn list_indexed_files(&self) -> Result<Vec<IndexedFile>> {
        match self.store.distinct_files().await {
            Ok(mut files) => {
                files.sort_by(|a, b| a.filename.cmp(&b.filename));
                Ok(files)
            }
            Err(e) => match self.on_store_unavailable {
                StoreUnavailablePolicy::FailOpen => {
                    warn!("File listing failed, returning empty list: {}", e);
                    Ok(Vec::new())
                }
                StoreUnavailablePolicy::FailClosed => Err(e),
            },
        }
    }
}

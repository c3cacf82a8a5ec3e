//! Ingestion, retrieval and answering pipelines over an [`IndexStore`].
//!
//! [`IndexStore`]: docrag_core::traits::IndexStore

pub mod answer;
pub mod api;
pub mod dedup;
pub mod events;
pub mod ingest;
pub mod llm;
pub mod retrieve;

use std::sync::Arc;

use docrag_core::error::{Error, Result};
use docrag_core::traits::Embedder;

pub use answer::{Answer, AnswerMode, Answerer, Completer};
pub use dedup::DedupGuard;
pub use events::{BucketEvent, EventHandler, LocalObjectFetcher, ObjectFetcher};
pub use ingest::{IngestOptions, IngestionPipeline};
pub use retrieve::RetrievalPipeline;

/// Run the embedder off the async scheduler.
pub(crate) async fn embed_blocking(embedder: Arc<dyn Embedder>, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
    tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
        .await
        .map_err(|e| Error::Embedding(format!("embedding task failed: {e}")))?
        .map_err(|e| Error::Embedding(e.to_string()))
}

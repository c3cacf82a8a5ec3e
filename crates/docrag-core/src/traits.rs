use async_trait::async_trait;

use crate::error::Result;
use crate::types::{IndexRow, IndexedFile, InsertOutcome, StoredHit};

/// Maps text to fixed-width vectors. Ingestion and query must share one model.
pub trait Embedder: Send + Sync {
    /// Stable identifier of the model/version (e.g. `local:all-MiniLM-L6-v2:d384`).
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Splits text into tokens, reported as byte spans into the input.
pub trait Tokenize: Send + Sync {
    fn token_spans(&self, text: &str) -> Result<Vec<(usize, usize)>>;
}

/// Persists chunk rows and answers metadata and similarity queries.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Width of the embedding column.
    fn dim(&self) -> usize;

    /// Bulk append.
    async fn insert_rows(&self, rows: &[IndexRow]) -> Result<usize>;

    /// Append `rows` only if no row with this `filepath` exists yet.
    async fn insert_if_absent(&self, filepath: &str, rows: &[IndexRow]) -> Result<InsertOutcome>;

    /// Number of rows whose metadata `filepath` equals the argument exactly.
    async fn count_by_filepath(&self, filepath: &str) -> Result<usize>;

    /// Distinct `{filename, filepath}` pairs, one per filename, ordered by filename.
    async fn distinct_files(&self) -> Result<Vec<IndexedFile>>;

    /// Up to `k` rows ordered by descending similarity to `query`.
    async fn nearest_neighbors(&self, query: &[f32], k: usize) -> Result<Vec<StoredHit>>;
}

/// A named blob of bytes handed to the ingestion pipeline.
#[async_trait]
pub trait ByteSource: Send + Sync {
    fn name(&self) -> &str;
    async fn read_all(&self) -> Result<Vec<u8>>;
}

//! Domain types shared by the ingestion and retrieval pipelines.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default embedding width (all-MiniLM-L6-v2).
pub const EMBEDDING_DIM: usize = 384;

/// Per-chunk metadata persisted next to the chunk text and its vector.
///
/// - `filename`: human-readable name of the source document
/// - `filepath`: canonical storage location; the dedup key
/// - `chunk_id`: 0-based position within the source document
/// - `doc_id`: globally unique id minted when the chunk is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub filename: String,
    pub filepath: String,
    pub chunk_id: usize,
    pub doc_id: String,
}

/// A chunk of a source document before it is embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A persisted Index Store row: chunk text, metadata and embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRow {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

/// Raw nearest-neighbor hit as returned by a store.
///
/// `score` is a similarity (higher is better). Stores that cannot report a
/// relevance score leave it empty.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredHit {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: Option<f32>,
}

/// A ranked retrieval result handed to callers and the context assembler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    #[serde(rename = "content")]
    pub text: String,
    pub similarity_score: f32,
    pub filename: String,
    pub filepath: String,
}

impl From<StoredHit> for ScoredChunk {
    fn from(hit: StoredHit) -> Self {
        Self {
            text: hit.text,
            similarity_score: hit.score.unwrap_or(0.0),
            filename: hit.metadata.filename,
            filepath: hit.metadata.filepath,
        }
    }
}

/// One entry of the indexed-files listing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexedFile {
    pub filename: String,
    pub filepath: String,
}

/// Result of an atomic insert-if-absent against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(usize),
    AlreadyPresent,
}

/// Why an ingestion request was skipped rather than processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UnsupportedFileType,
    AlreadyProcessed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnsupportedFileType => f.write_str("unsupported file type"),
            SkipReason::AlreadyProcessed => f.write_str("already processed"),
        }
    }
}

/// Non-error result of one ingestion call. Failures travel as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    /// Rows appended for the document (zero for an empty document).
    Processed { chunks: usize },
    Skipped(SkipReason),
}

/// What the read paths do when the Index Store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreUnavailablePolicy {
    /// Dedup answers "not indexed", listings come back empty.
    #[default]
    FailOpen,
    /// Store errors propagate to the caller.
    FailClosed,
}

/// What ingestion does when a single chunk record cannot be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkFailurePolicy {
    /// Abort the whole document; nothing is written.
    #[default]
    FailDocument,
    /// Log and drop the chunk, index the rest.
    SkipChunk,
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Index store error: {0}")]
    Store(String),

    #[error("Missing query parameter")]
    MissingQuery,

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Chunk {chunk_id} could not be constructed: {reason}")]
    ChunkConstruction { chunk_id: usize, reason: String },

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Object storage error: {0}")]
    ObjectStore(String),

    #[error("Completion failed: {0}")]
    Completion(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Client-side errors that the query surface reports as 400s.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::MissingQuery | Error::InvalidEvent(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

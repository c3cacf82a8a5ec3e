//! JSON request/response surface shared by the HTTP server and the CLI.
//!
//! Handlers here are transport-free; a failure is an [`ApiError`] carrying the
//! HTTP status to report.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use docrag_core::error::Error;
use docrag_core::types::{IndexedFile, ScoredChunk};

use crate::answer::{AnswerMode, Answerer};
use crate::events::{BucketEvent, EventHandler, EventReport};
use crate::retrieve::RetrievalPipeline;

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<ScoredChunk>,
}

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub files: Vec<IndexedFile>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub mode: AnswerMode,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn body(&self) -> ErrorBody {
        ErrorBody { status: "error", message: self.message.clone() }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::MissingQuery => ApiError { status: 400, message: Error::MissingQuery.to_string() },
            Error::InvalidEvent(message) => ApiError { status: 400, message },
            other => {
                error!("Request failed: {}", other);
                ApiError { status: 500, message: "Internal server error".into() }
            }
        }
    }
}

pub struct Api {
    retrieval: Arc<RetrievalPipeline>,
    answerer: Option<Arc<Answerer>>,
    events: Option<Arc<EventHandler>>,
    default_top_k: usize,
    max_top_k: usize,
}

impl Api {
    pub fn new(retrieval: Arc<RetrievalPipeline>, default_top_k: usize, max_top_k: usize) -> Self {
        let max_top_k = max_top_k.max(1);
        Self { retrieval, answerer: None, events: None, default_top_k: default_top_k.clamp(1, max_top_k), max_top_k }
    }

    pub fn with_answerer(mut self, answerer: Arc<Answerer>) -> Self {
        self.answerer = Some(answerer);
        self
    }

    pub fn with_events(mut self, events: Arc<EventHandler>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn search(&self, params: SearchParams) -> Result<SearchResponse, ApiError> {
        let query = params.query.unwrap_or_default();
        if query.trim().is_empty() {
            return Err(Error::MissingQuery.into());
        }
        let top_k = params.top_k.unwrap_or(self.default_top_k).clamp(1, self.max_top_k);
        let results = self.retrieval.search(&query, top_k).await?;
        Ok(SearchResponse { results })
    }

    pub async fn files(&self) -> Result<FilesResponse, ApiError> {
        let files = self.retrieval.list_indexed_files().await?;
        Ok(FilesResponse { count: files.len(), files })
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse { status: "ok" }
    }

    pub async fn ask(&self, request: AskRequest) -> Result<AskResponse, ApiError> {
        let answerer = self
            .answerer
            .as_ref()
            .ok_or_else(|| ApiError { status: 404, message: "answering is not enabled".into() })?;
        let answer = answerer.answer(&request.question).await?;
        Ok(AskResponse { answer: answer.answer, sources: answer.sources, mode: answer.mode })
    }

    pub async fn bucket_event(&self, payload: &[u8]) -> Result<EventReport, ApiError> {
        let events = self
            .events
            .as_ref()
            .ok_or_else(|| ApiError { status: 404, message: "event ingestion is not enabled".into() })?;
        let event = BucketEvent::from_slice(payload)?;
        Ok(events.handle(&event).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_mapping() {
        let missing = ApiError::from(Error::MissingQuery);
        assert_eq!(missing, ApiError { status: 400, message: "Missing query parameter".into() });
        assert_eq!(ApiError::from(Error::InvalidEvent("No records in event".into())).message, "No records in event");
        let internal = ApiError::from(Error::Store("connection refused".into()));
        assert_eq!(internal.status, 500);
        assert_eq!(internal.message, "Internal server error");
    }
}

//! Bucket-notification ingestion trigger (S3/MinIO event JSON).

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize, Serializer};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use docrag_core::error::{Error, Result};
use docrag_core::extract::FileKind;
use docrag_core::source::FileSource;
use docrag_core::types::{IngestStatus, SkipReason};

use crate::ingest::IngestionPipeline;

const OBJECT_CREATED_PREFIX: &str = "s3:ObjectCreated:";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: String,
    #[serde(default)]
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct S3Entity {
    #[serde(default)]
    pub bucket: NamedRef,
    #[serde(default)]
    pub object: KeyRef,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamedRef {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeyRef {
    #[serde(default)]
    pub key: Option<String>,
}

impl EventRecord {
    fn bucket_and_key(&self) -> Option<(&str, &str)> {
        let bucket = self.s3.bucket.name.as_deref().filter(|b| !b.is_empty())?;
        let key = self.s3.object.key.as_deref().filter(|k| !k.is_empty())?;
        Some((bucket, key))
    }
}

impl BucketEvent {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::InvalidEvent(format!("malformed event payload: {e}")))
    }
}

/// Copies an object into a local file.
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    async fn fetch_to(&self, bucket: &str, key: &str, dest: &Path) -> Result<()>;
}

/// Objects laid out on disk as `<root>/<bucket>/<key>`.
pub struct LocalObjectFetcher {
    root: PathBuf,
}

impl LocalObjectFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let rel = Path::new(bucket).join(key);
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(Error::ObjectStore(format!("refusing object path {bucket}/{key}")));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ObjectFetcher for LocalObjectFetcher {
    async fn fetch_to(&self, bucket: &str, key: &str, dest: &Path) -> Result<()> {
        let src = self.object_path(bucket, key)?;
        tokio::fs::copy(&src, dest)
            .await
            .map_err(|e| Error::ObjectStore(format!("{}: {e}", src.display())))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Processed,
    Skipped(SkipReason),
    Error(String),
}

impl Serialize for FileStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            FileStatus::Processed => serializer.serialize_str("processed"),
            FileStatus::Skipped(reason) => serializer.serialize_str(&format!("skipped:{reason}")),
            FileStatus::Error(msg) => serializer.serialize_str(&format!("error:{msg}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    pub bucket: String,
    pub status: FileStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventReport {
    pub status: &'static str,
    pub message: String,
    pub results: Vec<FileReport>,
}

pub struct EventHandler {
    pipeline: Arc<IngestionPipeline>,
    fetcher: Arc<dyn ObjectFetcher>,
    scheme: String,
}

impl EventHandler {
    pub fn new(pipeline: Arc<IngestionPipeline>, fetcher: Arc<dyn ObjectFetcher>, scheme: impl Into<String>) -> Self {
        Self { pipeline, fetcher, scheme: scheme.into() }
    }

    /// Ingest every `ObjectCreated` record. One file's failure is reported in
    /// its entry and never stops the others.
    pub async fn handle(&self, event: &BucketEvent) -> Result<EventReport> {
        if event.records.is_empty() {
            return Err(Error::InvalidEvent("No records in event".into()));
        }
        let mut results = Vec::new();
        for record in &event.records {
            let Some((bucket, key)) = record.bucket_and_key() else {
                error!("Invalid event record: missing bucket or object key");
                continue;
            };
            if !record.event_name.starts_with(OBJECT_CREATED_PREFIX) {
                info!("Skipping event type: {}", record.event_name);
                continue;
            }
            info!("Processing {} from bucket {}", key, bucket);
            results.push(self.process_object(bucket, key).await);
        }
        Ok(EventReport { status: "success", message: format!("Processed {} files", results.len()), results })
    }

    async fn process_object(&self, bucket: &str, raw_key: &str) -> FileReport {
        let key = match percent_decode_str(raw_key).decode_utf8() {
            Ok(k) => k.into_owned(),
            Err(e) => {
                return FileReport {
                    file: raw_key.to_string(),
                    bucket: bucket.to_string(),
                    status: FileStatus::Error(format!("undecodable key: {e}")),
                };
            }
        };
        let status = match self.fetch_and_ingest(bucket, &key).await {
            Ok(IngestStatus::Processed { .. }) => FileStatus::Processed,
            Ok(IngestStatus::Skipped(reason)) => FileStatus::Skipped(reason),
            Err(e) => {
                error!("Error processing {} from bucket {}: {}", key, bucket, e);
                FileStatus::Error(e.to_string())
            }
        };
        FileReport { file: key, bucket: bucket.to_string(), status }
    }

    async fn fetch_and_ingest(&self, bucket: &str, key: &str) -> Result<IngestStatus> {
        let Some(kind) = FileKind::from_filename(key) else {
            warn!("Unsupported file type: {}", key);
            return Ok(IngestStatus::Skipped(SkipReason::UnsupportedFileType));
        };
        // Removed on drop, whatever the outcome.
        let scratch = tempfile::Builder::new()
            .prefix("docrag-")
            .suffix(&format!(".{}", kind.extension()))
            .tempfile()?
            .into_temp_path();
        self.fetcher.fetch_to(bucket, key, &scratch).await?;
        let filepath = format!("{}://{}/{}", self.scheme, bucket, key);
        let source = FileSource::new(scratch.to_path_buf());
        let outcome = self.pipeline.ingest(&source, key, &filepath).await;
        if let Err(e) = scratch.close() {
            debug!("Scratch cleanup failed: {}", e);
        }
        outcome
    }
}

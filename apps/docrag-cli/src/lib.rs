//! Wiring shared by the `docrag` CLI and `docrag-server`.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use docrag_core::chunker::TokenChunker;
use docrag_core::config::{expand_path, ChunkTokenizer, Config, Settings};
use docrag_core::extract::FileKind;
use docrag_core::traits::{Embedder, IndexStore};
use docrag_embed::{get_default_embedder, resolve_model_dir, HfTokenizer};
use docrag_pipeline::api::Api;
use docrag_pipeline::llm::build_completer;
use docrag_pipeline::{Answerer, EventHandler, IngestOptions, IngestionPipeline, LocalObjectFetcher, RetrievalPipeline};
use docrag_vector::LanceIndexStore;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub fn load_settings() -> Result<Settings> {
    let config = Config::load().context("loading configuration")?;
    Ok(config.settings()?)
}

pub struct AppContext {
    pub settings: Settings,
    pub ingestion: Arc<IngestionPipeline>,
    pub retrieval: Arc<RetrievalPipeline>,
}

impl AppContext {
    pub async fn build(settings: Settings) -> Result<Self> {
        let embedding = settings.embedding.clone();
        let dim = settings.store.dim;
        let embedder: Arc<dyn Embedder> = tokio::task::spawn_blocking(move || get_default_embedder(&embedding, dim))
            .await
            .context("embedder loader panicked")??;
        if embedder.dim() != dim {
            bail!("embedder {} produces {}-d vectors but store.dim is {}", embedder.model_id(), embedder.dim(), dim);
        }

        let uri = expand_path(&settings.store.uri);
        let store: Arc<dyn IndexStore> =
            Arc::new(LanceIndexStore::open(&uri.to_string_lossy(), &settings.store.table, dim).await?);

        let chunker = build_chunker(&settings)?;
        let options = IngestOptions {
            on_chunk_failure: settings.ingestion.on_chunk_failure,
            on_store_unavailable: settings.retrieval.on_store_unavailable,
            embed_batch_size: settings.embedding.batch_size,
        };
        let ingestion = Arc::new(IngestionPipeline::new(embedder.clone(), store.clone(), chunker, options)?);
        let retrieval = Arc::new(RetrievalPipeline::new(embedder, store, settings.retrieval.on_store_unavailable)?);
        info!("Pipelines ready (model={}, table={})", settings.embedding.model_id, settings.store.table);
        Ok(Self { settings, ingestion, retrieval })
    }

    pub fn answerer(&self) -> Result<Arc<Answerer>> {
        let completer = build_completer(&self.settings.llm)?;
        Ok(Arc::new(Answerer::new(
            self.retrieval.clone(),
            completer,
            self.settings.retrieval.top_k,
            self.settings.retrieval.similarity_threshold,
        )))
    }

    pub fn event_handler(&self) -> Arc<EventHandler> {
        let fetcher = Arc::new(LocalObjectFetcher::new(expand_path(&self.settings.ingestion.object_root)));
        Arc::new(EventHandler::new(self.ingestion.clone(), fetcher, self.settings.ingestion.scheme.clone()))
    }

    pub fn api(&self) -> Result<Api> {
        Ok(Api::new(self.retrieval.clone(), self.settings.retrieval.top_k, self.settings.retrieval.max_top_k)
            .with_answerer(self.answerer()?)
            .with_events(self.event_handler()))
    }
}

fn build_chunker(settings: &Settings) -> Result<TokenChunker> {
    let config = settings.chunking.as_config();
    Ok(match settings.chunking.tokenizer {
        ChunkTokenizer::Whitespace => TokenChunker::whitespace(config)?,
        ChunkTokenizer::Model => {
            let dir = resolve_model_dir(&settings.embedding.model_dir)?;
            TokenChunker::new(Arc::new(HfTokenizer::from_file(&dir.join("tokenizer.json"))?), config)?
        }
    })
}

/// Supported files under `paths` (files are taken as-is, directories are
/// walked), sorted and deduplicated.
pub fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && is_supported(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files.dedup();
    files
}

fn is_supported(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(FileKind::from_filename)
        .is_some()
}

/// Dedup key for a local file: its absolute path.
pub fn local_filepath(path: &Path) -> Result<String> {
    let abs = std::fs::canonicalize(path).with_context(|| format!("resolving {}", path.display()))?;
    Ok(abs.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_supported_files_recursively() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("a.txt"), "a").unwrap();
        std::fs::write(tmp.path().join("sub").join("b.PDF"), "b").unwrap();
        std::fs::write(tmp.path().join("sub").join("c.png"), "c").unwrap();
        let explicit = tmp.path().join("c-explicit.md");
        std::fs::write(&explicit, "d").unwrap();

        let files = collect_files(&[tmp.path().to_path_buf(), explicit.clone()]);
        let names: Vec<String> = files.iter().map(|p| p.file_name().unwrap().to_string_lossy().to_string()).collect();
        assert!(names.contains(&"a.txt".to_string()));
        assert!(names.contains(&"b.PDF".to_string()));
        assert!(!names.contains(&"c.png".to_string()));
        // Explicit files are passed through; the pipeline reports the skip.
        assert!(files.contains(&explicit));
    }

    #[test]
    fn local_filepath_is_absolute() {
        let tmp = tempfile::TempDir::new().unwrap();
        let p = tmp.path().join("x.txt");
        std::fs::write(&p, "x").unwrap();
        assert!(Path::new(&local_filepath(&p).unwrap()).is_absolute());
        assert!(local_filepath(&tmp.path().join("missing.txt")).is_err());
    }
}

//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_STORE__URI`). [`Settings`] is the
//! typed view with defaults for every key.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::chunker::ChunkingConfig;
use crate::context::DEFAULT_SIMILARITY_THRESHOLD;
use crate::error::{Error, Result};
use crate::types::{ChunkFailurePolicy, StoreUnavailablePolicy, EMBEDDING_DIM};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    /// Typed settings: built-in defaults overlaid with every configured source.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(self.figment.clone())
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub ingestion: IngestionSettings,
    pub llm: LlmSettings,
    pub server: ServerSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.as_config().validate()?;
        if self.store.dim == 0 {
            return Err(Error::InvalidConfig("store.dim must be greater than zero".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size must be greater than zero".into()));
        }
        let t = self.retrieval.similarity_threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(Error::InvalidConfig(format!(
                "retrieval.similarity_threshold must be within [0, 1], got {t}"
            )));
        }
        if self.retrieval.top_k == 0 || self.retrieval.top_k > self.retrieval.max_top_k {
            return Err(Error::InvalidConfig(format!(
                "retrieval.top_k must be within [1, {}], got {}",
                self.retrieval.max_top_k, self.retrieval.top_k
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub uri: String,
    pub table: String,
    pub dim: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { uri: "data/lancedb".into(), table: "data_chunks".into(), dim: EMBEDDING_DIM }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: String,
    pub model_id: String,
    pub max_len: usize,
    /// Chunks per embedder call during ingestion.
    pub batch_size: usize,
    pub fake: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model_dir: "models/all-MiniLM-L6-v2".into(),
            model_id: "all-MiniLM-L6-v2".into(),
            max_len: 256,
            batch_size: 32,
            fake: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkTokenizer {
    #[default]
    Whitespace,
    /// The embedding model's own tokenizer (`tokenizer.json` in `model_dir`).
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub tokenizer: ChunkTokenizer,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        let defaults = ChunkingConfig::default();
        Self { chunk_size: defaults.chunk_size, chunk_overlap: defaults.overlap, tokenizer: ChunkTokenizer::default() }
    }
}

impl ChunkingSettings {
    pub fn as_config(&self) -> ChunkingConfig {
        ChunkingConfig { chunk_size: self.chunk_size, overlap: self.chunk_overlap }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub max_top_k: usize,
    pub similarity_threshold: f32,
    pub on_store_unavailable: StoreUnavailablePolicy,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_top_k: 50,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            on_store_unavailable: StoreUnavailablePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    pub on_chunk_failure: ChunkFailurePolicy,
    /// Local directory holding one sub-directory per bucket.
    pub object_root: String,
    /// Scheme used when synthesizing `<scheme>://<bucket>/<key>` filepaths.
    pub scheme: String,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            on_chunk_failure: ChunkFailurePolicy::default(),
            object_root: "data/buckets".into(),
            scheme: "minio".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[default]
    Ollama,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub openai_api_base: String,
    pub openai_model: String,
    pub openai_api_key: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            ollama_base_url: "http://localhost:11434".into(),
            ollama_model: "llama3.1:8b".into(),
            openai_api_base: "https://api.openai.com/v1".into(),
            openai_model: "gpt-3.5-turbo".into(),
            openai_api_key: String::new(),
            temperature: 0.7,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 5001 }
    }
}

/// Expand `$VAR`/`${VAR}` and a leading `~` in a configured path. The result
/// is not canonicalized; unknown variables are left as written.
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let raw = input.as_ref();
    let with_env = shellexpand::env(raw).unwrap_or(std::borrow::Cow::Borrowed(raw));
    PathBuf::from(shellexpand::tilde(&with_env).as_ref())
}

//! Sentence embeddings for chunk text and queries.
//!
//! [`MiniLmEmbedder`] runs a local BERT-family sentence-transformer
//! (all-MiniLM-L6-v2 by default) through candle with masked mean pooling and
//! L2 normalization. [`FakeEmbedder`] is a deterministic hash-based stand-in
//! for tests and offline runs.

pub mod device;
pub mod pool;
pub mod tokenize;

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use docrag_core::config::{expand_path, EmbeddingSettings};
use docrag_core::traits::Embedder;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use tokenize::HfTokenizer;

pub struct MiniLmEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dim: usize,
    max_len: usize,
}

impl MiniLmEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let device = select_device();
        let model_dir = resolve_model_dir(&settings.model_dir)?;
        info!("Loading {} from {}", settings.model_id, model_dir.display());

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let raw_config = std::fs::read_to_string(&config_path)?;
        let config: BertConfig = serde_json::from_str(&raw_config)?;
        let dim = serde_json::from_str::<serde_json::Value>(&raw_config)?
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow!("config.json has no hidden_size"))? as usize;

        let vb = load_weights(&model_dir, &device)?;
        let model = BertModel::load(vb, &config)?;
        info!("Embedding model ready (dim={})", dim);
        Ok(Self { model, tokenizer, device, model_id: settings.model_id.clone(), dim, max_len: settings.max_len })
    }

    fn embed_inner(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let (input_ids, attention_mask) =
            tokenize::tokenize_batch_on_device(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        Ok(rows)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        let tensors = candle_core::safetensors::load(&safetensors, device)?;
        return Ok(VarBuilder::from_tensors(tensors, DTYPE, device));
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        let weights = candle_core::pickle::read_all(&pickle)?;
        let tensors: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
        return Ok(VarBuilder::from_tensors(tensors, DTYPE, device));
    }
    Err(anyhow!("No model.safetensors or pytorch_model.bin in {}", model_dir.display()))
}

impl Embedder for MiniLmEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let out = self.embed_inner(texts)?;
        let ms = start.elapsed().as_millis();
        if ms > 100 * texts.len() as u128 {
            warn!("Slow embedding: {} texts in {} ms", texts.len(), ms);
        } else {
            debug!("Embedded {} texts in {} ms", texts.len(), ms);
        }
        Ok(out)
    }
}

/// Deterministic bag-of-words hashing embedder. Texts sharing words land
/// close together, which is enough for pipeline tests.
pub struct FakeEmbedder {
    dim: usize,
    model_id: String,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, model_id: format!("fake:xxh64:d{dim}") }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            v[idx] += 0.5 + (((h >> 32) as u32) as f32) / (u32::MAX as f32);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn fake_requested(settings: &EmbeddingSettings) -> bool {
    settings.fake
        || std::env::var("APP_USE_FAKE_EMBEDDINGS")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
}

/// Build the configured embedder. `dim` sizes the fake embedder; the real
/// model reports its own width.
pub fn get_default_embedder(settings: &EmbeddingSettings, dim: usize) -> Result<Arc<dyn Embedder>> {
    if fake_requested(settings) {
        info!("Using FakeEmbedder (dim={})", dim);
        return Ok(Arc::new(FakeEmbedder::new(dim)));
    }
    Ok(Arc::new(MiniLmEmbedder::new(settings)?))
}

/// Locate the model directory: `APP_MODEL_DIR`, then `MODEL_DIR`, then the
/// configured path and its parent-relative variant.
pub fn resolve_model_dir(configured: &str) -> Result<PathBuf> {
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = expand_path(&dir);
            if p.exists() {
                debug!("Using {}: {}", var, p.display());
                return Ok(p);
            }
        }
    }
    let p = expand_path(configured);
    if p.exists() {
        return Ok(p);
    }
    if p.is_relative() {
        let up = Path::new("..").join(&p);
        if up.exists() {
            return Ok(up);
        }
    }
    Err(anyhow!("Could not locate model directory '{}'", configured))
}

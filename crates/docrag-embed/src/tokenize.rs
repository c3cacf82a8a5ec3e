use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

use docrag_core::error::Error;
use docrag_core::traits::Tokenize;

/// Encode `texts`, truncate each to `max_len` and right-pad to the longest
/// survivor. Returns `(input_ids, attention_mask)`, both `[B, T]` u32.
pub fn tokenize_batch_on_device(
    tokenizer: &Tokenizer,
    texts: &[String],
    max_len: usize,
    device: &Device,
) -> Result<(Tensor, Tensor)> {
    let mut rows: Vec<(Vec<u32>, Vec<u32>)> = Vec::with_capacity(texts.len());
    for text in texts {
        let enc = tokenizer.encode(text.as_str(), true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        let mut ids = enc.get_ids().to_vec();
        let mut mask = enc.get_attention_mask().to_vec();
        ids.truncate(max_len);
        mask.truncate(max_len);
        rows.push((ids, mask));
    }
    let width = rows.iter().map(|(ids, _)| ids.len()).max().unwrap_or(0).max(1);
    let mut all_ids = Vec::with_capacity(rows.len() * width);
    let mut all_mask = Vec::with_capacity(rows.len() * width);
    for (mut ids, mut mask) in rows {
        ids.resize(width, 0);
        mask.resize(width, 0);
        all_ids.extend(ids);
        all_mask.extend(mask);
    }
    let batch = texts.len();
    let input_ids = Tensor::from_vec(all_ids, (batch, width), device)?;
    let attention_mask = Tensor::from_vec(all_mask, (batch, width), device)?;
    Ok((input_ids, attention_mask))
}

/// The embedding model's tokenizer, exposed for chunk boundaries.
///
/// Special tokens are not added and truncation/padding are disabled so the
/// spans cover the whole input.
pub struct HfTokenizer {
    inner: Tokenizer,
}

impl HfTokenizer {
    pub fn new(mut inner: Tokenizer) -> Result<Self> {
        inner
            .with_truncation(None)
            .map_err(|e| anyhow!("Failed to disable truncation: {}", e))?;
        inner.with_padding(None);
        Ok(Self { inner })
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", path.display(), e))?;
        Self::new(tokenizer)
    }
}

impl Tokenize for HfTokenizer {
    fn token_spans(&self, text: &str) -> docrag_core::error::Result<Vec<(usize, usize)>> {
        let enc = self
            .inner
            .encode(text, false)
            .map_err(|e| Error::Embedding(format!("tokenization failed: {e}")))?;
        Ok(enc.get_offsets().iter().copied().filter(|(s, e)| e > s).collect())
    }
}

//! Token-bounded chunking with overlap.
//!
//! Boundaries are decided on token spans from a [`Tokenize`] implementation;
//! each chunk is the contiguous source substring covering its tokens, so the
//! last `overlap` tokens of chunk *i* open chunk *i + 1*.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::traits::Tokenize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 800, overlap: 50 }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be greater than zero".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Whitespace-delimited words; one word is one token.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhitespaceTokenizer;

impl Tokenize for WhitespaceTokenizer {
    fn token_spans(&self, text: &str) -> Result<Vec<(usize, usize)>> {
        let mut spans = Vec::new();
        let mut start = None;
        for (i, ch) in text.char_indices() {
            match (ch.is_whitespace(), start) {
                (true, Some(s)) => {
                    spans.push((s, i));
                    start = None;
                }
                (false, None) => start = Some(i),
                _ => {}
            }
        }
        if let Some(s) = start {
            spans.push((s, text.len()));
        }
        Ok(spans)
    }
}

pub struct TokenChunker {
    tokenizer: Arc<dyn Tokenize>,
    config: ChunkingConfig,
}

impl TokenChunker {
    pub fn new(tokenizer: Arc<dyn Tokenize>, config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { tokenizer, config })
    }

    pub fn whitespace(config: ChunkingConfig) -> Result<Self> {
        Self::new(Arc::new(WhitespaceTokenizer), config)
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Split `text` into ordered, overlapping, token-bounded chunks.
    ///
    /// Text without tokens yields no chunks. Text that fits in one chunk is
    /// returned whole.
    pub fn token_chunks(&self, text: &str) -> Result<Vec<String>> {
        let spans = self.tokenizer.token_spans(text)?;
        if spans.is_empty() {
            return Ok(vec![]);
        }
        if spans.len() <= self.config.chunk_size {
            return Ok(vec![text.to_string()]);
        }
        let mut chunks = Vec::new();
        let mut start = 0usize;
        loop {
            let end = (start + self.config.chunk_size).min(spans.len());
            let (from, _) = spans[start];
            let (_, to) = spans[end - 1];
            let slice = text
                .get(from..to)
                .ok_or_else(|| Error::Extraction(format!("token span {from}..{to} is not on a char boundary")))?;
            chunks.push(slice.to_string());
            if end >= spans.len() {
                break;
            }
            start += self.config.step();
        }
        Ok(chunks)
    }
}

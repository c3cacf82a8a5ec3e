//! In-memory [`IndexStore`] with brute-force cosine search.
//!
//! Used by tests and by runs that do not need persistence.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use docrag_core::error::{Error, Result};
use docrag_core::traits::IndexStore;
use docrag_core::types::{IndexRow, IndexedFile, InsertOutcome, StoredHit};

#[derive(Clone)]
pub struct MemoryIndexStore {
    dim: usize,
    rows: Arc<RwLock<Vec<IndexRow>>>,
}

impl MemoryIndexStore {
    pub fn new(dim: usize) -> Self {
        Self { dim, rows: Arc::new(RwLock::new(Vec::new())) }
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Snapshot of every stored row in insertion order.
    pub async fn rows(&self) -> Vec<IndexRow> {
        self.rows.read().await.clone()
    }

    fn check_rows(&self, rows: &[IndexRow]) -> Result<()> {
        match rows.iter().find(|r| r.embedding.len() != self.dim) {
            Some(bad) => Err(Error::DimensionMismatch { expected: self.dim, got: bad.embedding.len() }),
            None => Ok(()),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn insert_rows(&self, rows: &[IndexRow]) -> Result<usize> {
        self.check_rows(rows)?;
        self.rows.write().await.extend_from_slice(rows);
        Ok(rows.len())
    }

    async fn insert_if_absent(&self, filepath: &str, rows: &[IndexRow]) -> Result<InsertOutcome> {
        self.check_rows(rows)?;
        let mut guard = self.rows.write().await;
        if guard.iter().any(|r| r.metadata.filepath == filepath) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        guard.extend_from_slice(rows);
        Ok(InsertOutcome::Inserted(rows.len()))
    }

    async fn count_by_filepath(&self, filepath: &str) -> Result<usize> {
        Ok(self.rows.read().await.iter().filter(|r| r.metadata.filepath == filepath).count())
    }

    async fn distinct_files(&self) -> Result<Vec<IndexedFile>> {
        let mut by_name: BTreeMap<&str, &str> = BTreeMap::new();
        let guard = self.rows.read().await;
        for row in guard.iter() {
            let path = row.metadata.filepath.as_str();
            let entry = by_name.entry(row.metadata.filename.as_str()).or_insert(path);
            if path < *entry {
                *entry = path;
            }
        }
        Ok(by_name
            .into_iter()
            .map(|(name, path)| IndexedFile { filename: name.to_string(), filepath: path.to_string() })
            .collect())
    }

    async fn nearest_neighbors(&self, query: &[f32], k: usize) -> Result<Vec<StoredHit>> {
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, got: query.len() });
        }
        let guard = self.rows.read().await;
        let mut scored: Vec<(f32, &IndexRow)> =
            guard.iter().map(|r| (cosine_similarity(query, &r.embedding), r)).collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, r)| StoredHit { text: r.text.clone(), metadata: r.metadata.clone(), score: Some(score) })
            .collect())
    }
}

//! [`IndexStore`] backed by a LanceDB table.

use arrow_array::RecordBatchIterator;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::Table;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use docrag_core::error::{Error, Result};
use docrag_core::traits::IndexStore;
use docrag_core::types::{IndexRow, IndexedFile, InsertOutcome, StoredHit};

use crate::schema::{build_chunk_schema, COL_CHUNK_ID, COL_FILENAME, COL_FILEPATH};
use crate::search::{string_col, vector_search};
use crate::table::{ensure_table, eq_filter, open_checked, open_db, store_err};
use crate::writer::rows_to_record_batch;

pub struct LanceIndexStore {
    table: Table,
    table_name: String,
    dim: usize,
    // Serializes check-then-insert within this process.
    write_lock: Mutex<()>,
}

impl LanceIndexStore {
    /// Connect to `uri`, create `table_name` if missing and verify its vector width.
    pub async fn open(uri: &str, table_name: &str, dim: usize) -> Result<Self> {
        let width = i32::try_from(dim).map_err(|_| Error::InvalidConfig(format!("dimension {dim} too large")))?;
        let conn = open_db(uri).await?;
        ensure_table(&conn, table_name, build_chunk_schema(width)).await?;
        let table = open_checked(&conn, table_name, dim).await?;
        info!("Index store ready: {} / {} (dim={})", uri, table_name, dim);
        Ok(Self { table, table_name: table_name.to_string(), dim, write_lock: Mutex::new(()) })
    }

    pub async fn count_all(&self) -> Result<usize> {
        self.table.count_rows(None).await.map_err(store_err)
    }
}

#[async_trait]
impl IndexStore for LanceIndexStore {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn insert_rows(&self, rows: &[IndexRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let batch = rows_to_record_batch(rows, self.dim)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        self.table.add(reader).execute().await.map_err(store_err)?;
        debug!("Appended {} rows to '{}'", rows.len(), self.table_name);
        Ok(rows.len())
    }

    async fn insert_if_absent(&self, filepath: &str, rows: &[IndexRow]) -> Result<InsertOutcome> {
        let _guard = self.write_lock.lock().await;
        if self.count_by_filepath(filepath).await? > 0 {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        if rows.is_empty() {
            return Ok(InsertOutcome::Inserted(0));
        }
        let batch = rows_to_record_batch(rows, self.dim)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        // (filepath, chunk_id) is unique; existing keys are never overwritten.
        let mut mi = self.table.merge_insert(&[COL_FILEPATH, COL_CHUNK_ID]);
        mi.when_not_matched_insert_all();
        let res = mi.execute(reader).await.map_err(store_err)?;
        let inserted = usize::try_from(res.num_inserted_rows).unwrap_or(usize::MAX);
        if inserted == 0 {
            // Another writer committed every key first.
            return Ok(InsertOutcome::AlreadyPresent);
        }
        if inserted < rows.len() {
            warn!("{}: {} of {} rows already present", filepath, rows.len() - inserted, rows.len());
        }
        debug!("Inserted {} rows for {}", inserted, filepath);
        Ok(InsertOutcome::Inserted(inserted))
    }

    async fn count_by_filepath(&self, filepath: &str) -> Result<usize> {
        self.table
            .count_rows(Some(eq_filter(COL_FILEPATH, filepath)))
            .await
            .map_err(store_err)
    }

    async fn distinct_files(&self) -> Result<Vec<IndexedFile>> {
        let mut stream = self
            .table
            .query()
            .select(Select::columns(&[COL_FILENAME, COL_FILEPATH]))
            .execute()
            .await
            .map_err(store_err)?;
        // One entry per filename; the smallest filepath wins.
        let mut by_name: BTreeMap<String, String> = BTreeMap::new();
        while let Some(batch) = stream.try_next().await.map_err(store_err)? {
            let names = string_col(&batch, COL_FILENAME)?;
            let paths = string_col(&batch, COL_FILEPATH)?;
            for i in 0..batch.num_rows() {
                let path = paths.value(i);
                by_name
                    .entry(names.value(i).to_string())
                    .and_modify(|p| {
                        if path < p.as_str() {
                            *p = path.to_string();
                        }
                    })
                    .or_insert_with(|| path.to_string());
            }
        }
        Ok(by_name.into_iter().map(|(filename, filepath)| IndexedFile { filename, filepath }).collect())
    }

    async fn nearest_neighbors(&self, query: &[f32], k: usize) -> Result<Vec<StoredHit>> {
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, got: query.len() });
        }
        if k == 0 || self.count_all().await? == 0 {
            return Ok(Vec::new());
        }
        vector_search(&self.table, query, k).await
    }
}

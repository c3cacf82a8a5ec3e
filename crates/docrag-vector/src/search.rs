use arrow_array::{Array, Float32Array, Int32Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};

use docrag_core::error::{Error, Result};
use docrag_core::types::{ChunkMetadata, StoredHit};

use crate::schema::{COL_CHUNK_ID, COL_DOC_ID, COL_FILENAME, COL_FILEPATH, COL_TEXT};
use crate::table::store_err;

pub(crate) fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::Store(format!("column '{name}' missing or not utf8")))
}

fn int_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| Error::Store(format!("column '{name}' missing or not int32")))
}

/// Cosine similarity from LanceDB's `_distance` (cosine distance), when present.
fn scores(batch: &RecordBatch) -> Option<&Float32Array> {
    batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>())
}

pub(crate) fn hits_from_batch(batch: &RecordBatch) -> Result<Vec<StoredHit>> {
    let doc_ids = string_col(batch, COL_DOC_ID)?;
    let filenames = string_col(batch, COL_FILENAME)?;
    let filepaths = string_col(batch, COL_FILEPATH)?;
    let chunk_ids = int_col(batch, COL_CHUNK_ID)?;
    let texts = string_col(batch, COL_TEXT)?;
    let distances = scores(batch);

    let mut hits = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let score = distances.filter(|d| d.is_valid(i)).map(|d| 1.0 - d.value(i));
        hits.push(StoredHit {
            text: texts.value(i).to_string(),
            metadata: ChunkMetadata {
                filename: filenames.value(i).to_string(),
                filepath: filepaths.value(i).to_string(),
                chunk_id: usize::try_from(chunk_ids.value(i)).unwrap_or_default(),
                doc_id: doc_ids.value(i).to_string(),
            },
            score,
        });
    }
    Ok(hits)
}

/// Top-`k` rows by cosine similarity, best first.
pub async fn vector_search(table: &Table, query: &[f32], k: usize) -> Result<Vec<StoredHit>> {
    let mut stream = table
        .vector_search(query.to_vec())
        .map_err(store_err)?
        .distance_type(DistanceType::Cosine)
        .limit(k)
        .execute()
        .await
        .map_err(store_err)?;
    let mut hits = Vec::new();
    while let Some(batch) = stream.try_next().await.map_err(store_err)? {
        hits.extend(hits_from_batch(&batch)?);
    }
    hits.sort_by(|a, b| {
        let (sa, sb) = (a.score.unwrap_or(f32::MIN), b.score.unwrap_or(f32::MIN));
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(k);
    Ok(hits)
}

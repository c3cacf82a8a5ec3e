use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use std::sync::Arc;

use docrag_core::error::{Error, Result};
use docrag_core::types::IndexRow;

use crate::schema::build_chunk_schema;

/// Build one Arrow batch from rows. Every embedding must be `dim` wide.
pub fn rows_to_record_batch(rows: &[IndexRow], dim: usize) -> Result<RecordBatch> {
    let width = i32::try_from(dim).map_err(|_| Error::Store(format!("dimension {dim} too large")))?;
    let now = Utc::now().timestamp_millis();

    let mut doc_ids = Vec::with_capacity(rows.len());
    let mut filenames = Vec::with_capacity(rows.len());
    let mut filepaths = Vec::with_capacity(rows.len());
    let mut chunk_ids = Vec::with_capacity(rows.len());
    let mut texts = Vec::with_capacity(rows.len());
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(rows.len());
    for row in rows {
        if row.embedding.len() != dim {
            return Err(Error::DimensionMismatch { expected: dim, got: row.embedding.len() });
        }
        let chunk_id = i32::try_from(row.metadata.chunk_id)
            .map_err(|_| Error::Store(format!("chunk_id {} out of range", row.metadata.chunk_id)))?;
        doc_ids.push(row.metadata.doc_id.as_str());
        filenames.push(row.metadata.filename.as_str());
        filepaths.push(row.metadata.filepath.as_str());
        chunk_ids.push(chunk_id);
        texts.push(row.text.as_str());
        vectors.push(Some(row.embedding.iter().map(|&x| Some(x)).collect()));
    }

    RecordBatch::try_new(
        build_chunk_schema(width),
        vec![
            Arc::new(StringArray::from(doc_ids)),
            Arc::new(StringArray::from(filenames)),
            Arc::new(StringArray::from(filepaths)),
            Arc::new(Int32Array::from(chunk_ids)),
            Arc::new(StringArray::from(texts)),
            Arc::new(TimestampMillisecondArray::from(vec![now; rows.len()])),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, width)),
        ],
    )
    .map_err(|e| Error::Store(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrag_core::types::ChunkMetadata;

    fn row(chunk_id: usize, dim: usize) -> IndexRow {
        IndexRow {
            text: format!("chunk {chunk_id}"),
            metadata: ChunkMetadata {
                filename: "a.txt".into(),
                filepath: "/d/a.txt".into(),
                chunk_id,
                doc_id: format!("id-{chunk_id}"),
            },
            embedding: vec![0.5; dim],
        }
    }

    #[test]
    fn builds_batch_with_all_columns() {
        let batch = rows_to_record_batch(&[row(0, 4), row(1, 4)], 4).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 7);
    }

    #[test]
    fn wrong_width_is_rejected() {
        let err = rows_to_record_batch(&[row(0, 3)], 4).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 4, got: 3 }));
    }
}

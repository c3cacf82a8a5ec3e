use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const COL_DOC_ID: &str = "doc_id";
pub const COL_FILENAME: &str = "filename";
pub const COL_FILEPATH: &str = "filepath";
pub const COL_CHUNK_ID: &str = "chunk_id";
pub const COL_TEXT: &str = "text";
pub const COL_INGESTED_AT: &str = "ingested_at";
pub const COL_VECTOR: &str = "vector";

pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(COL_DOC_ID, DataType::Utf8, false),
        Field::new(COL_FILENAME, DataType::Utf8, false),
        Field::new(COL_FILEPATH, DataType::Utf8, false),
        Field::new(COL_CHUNK_ID, DataType::Int32, false),
        Field::new(COL_TEXT, DataType::Utf8, false),
        Field::new(COL_INGESTED_AT, DataType::Timestamp(TimeUnit::Millisecond, None), false),
        Field::new(
            COL_VECTOR,
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
            true,
        ),
    ]))
}

/// Width of the vector column, if the schema has one.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
    match schema.field_with_name(COL_VECTOR).ok()?.data_type() {
        DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_width_round_trips() {
        assert_eq!(vector_dim(&build_chunk_schema(384)), Some(384));
        let no_vec = Schema::new(vec![Field::new("x", DataType::Utf8, false)]);
        assert_eq!(vector_dim(&no_vec), None);
    }
}

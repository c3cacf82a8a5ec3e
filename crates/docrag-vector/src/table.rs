//! LanceDB connection and housekeeping helpers.

use arrow_array::RecordBatchIterator;
use arrow_schema::Schema;
use lancedb::{connect, Connection, Table};
use std::sync::Arc;
use tracing::info;

use docrag_core::error::{Error, Result};

use crate::schema::vector_dim;

pub(crate) fn store_err(e: impl std::fmt::Display) -> Error {
    Error::Store(e.to_string())
}

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(store_err)
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<Schema>) -> Result<()> {
    let names = conn.table_names().execute().await.map_err(store_err)?;
    if names.iter().any(|n| n == name) {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await.map_err(store_err)?;
    info!("Created table '{}'", name);
    Ok(())
}

/// Open `name`, failing if its vector column width differs from `dim`.
pub async fn open_checked(conn: &Connection, name: &str, dim: usize) -> Result<Table> {
    let table = conn.open_table(name).execute().await.map_err(store_err)?;
    let schema = table.schema().await.map_err(store_err)?;
    match vector_dim(&schema) {
        Some(got) if got == dim => Ok(table),
        Some(got) => Err(Error::DimensionMismatch { expected: dim, got }),
        None => Err(Error::Store(format!("table '{name}' has no vector column"))),
    }
}

pub fn eq_filter(column: &str, value: &str) -> String {
    format!("{} = '{}'", column, value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_escapes_quotes() {
        assert_eq!(eq_filter("filepath", "/data/o'brien.txt"), "filepath = '/data/o''brien.txt'");
    }
}

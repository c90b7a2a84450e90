use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("checkpoint file {path} is unreadable: {source}")]
    CorruptCheckpoint {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("record {0} write rejected")]
    WriteRejected(i64),

    #[error("unexpected column {column}: {detail}")]
    Column { column: String, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[cfg(feature = "duckdb")]
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("{0}")]
    Other(String),
}

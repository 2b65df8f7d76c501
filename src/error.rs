use std::path::PathBuf;

use thiserror::Error;

/// Batch-level ingestion failures. Row-level problems are reported as
/// [`crate::models::InvalidRow`] values instead and never abort a batch.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("header row not found: none of the first {scanned} rows contains {anchor:?}")]
    HeaderNotFound { anchor: &'static str, scanned: usize },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV header: {0}")]
    Csv(#[from] csv::Error),

    #[error("persistence failure ({committed} rows committed): {source}")]
    Persistence {
        committed: u64,
        #[source]
        source: StoreError,
    },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to open store: {0}")]
    Open(#[source] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("database error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("failed to encode passthrough columns: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

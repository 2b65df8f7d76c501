use std::path::Path;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::{Store, UploadLog};
use crate::error::IngestError;
use crate::header::{self, HeaderLocation, DEFAULT_SCAN_ROWS};
use crate::models::{BookingRecord, IngestSummary, InvalidRow};
use crate::normalize::{self, ColumnMap, Field};
use crate::record;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub header_scan_rows: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            header_scan_rows: DEFAULT_SCAN_ROWS,
        }
    }
}

/// Parsed and classified rows of one file, ready for the store.
#[derive(Debug)]
pub struct PreparedBatch {
    pub header: HeaderLocation,
    pub delimiter: u8,
    pub records: Vec<BookingRecord>,
    pub invalid_rows: Vec<InvalidRow>,
}

pub async fn ingest_path(
    store: &Store,
    path: &Path,
    options: &IngestOptions,
) -> Result<IngestSummary, IngestError> {
    let bytes = std::fs::read(path).map_err(|source| IngestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let content = String::from_utf8_lossy(&bytes);
    ingest_content(store, &path.display().to_string(), &content, options).await
}

#[instrument(skip(store, content, options))]
pub async fn ingest_content(
    store: &Store,
    source: &str,
    content: &str,
    options: &IngestOptions,
) -> Result<IngestSummary, IngestError> {
    let batch = prepare_batch(content, options)?;
    let upload = UploadLog {
        upload_id: Uuid::new_v4(),
        source: source.to_string(),
        header_row: batch.header.row_index,
        delimiter: char::from(batch.delimiter),
        invalid_count: batch.invalid_rows.len() as u64,
    };

    let (inserted_count, skipped_count) = store
        .insert_batch(&upload, &batch.records)
        .await
        .map_err(|source| IngestError::Persistence {
            committed: 0,
            source,
        })?;

    let summary = IngestSummary {
        upload_id: upload.upload_id,
        source: upload.source,
        header_row: batch.header.row_index,
        inserted_count,
        skipped_count,
        invalid_row_count: batch.invalid_rows.len() as u64,
        invalid_rows: batch.invalid_rows,
    };
    info!(
        inserted = summary.inserted_count,
        skipped = summary.skipped_count,
        invalid = summary.invalid_row_count,
        "ingestion finished"
    );
    Ok(summary)
}

/// Header detection, normalization, classification and record building for one file.
pub fn prepare_batch(content: &str, options: &IngestOptions) -> Result<PreparedBatch, IngestError> {
    let delimiter = header::detect_delimiter(content);
    let header = header::detect_header(content, delimiter, options.header_scan_rows)?;
    info!(
        header_line = header.row_index + 1,
        delimiter = %char::from(delimiter).escape_default(),
        "header located"
    );

    let map = ColumnMap::from_headers(&header.columns);
    for field in [Field::FirstName, Field::LastName, Field::TaskName, Field::TaskType] {
        if !map.has(field) {
            warn!(?field, "column not present; values will be empty");
        }
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(content[header.byte_offset..].as_bytes());

    let mut records = Vec::new();
    let mut invalid_rows = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        let line = match &result {
            Ok(row) => row.position().map(|pos| pos.line()),
            Err(err) => err.position().map(|pos| pos.line()),
        }
        .unwrap_or((idx + 2) as u64)
            + header.row_index as u64;

        let normalized = result
            .map_err(|err| InvalidRow {
                line,
                reason: format!("malformed row: {err}"),
            })
            .and_then(|row| normalize::normalize_row(&map, &row, line));

        match normalized {
            Ok(row) => records.push(record::build_record(row)),
            Err(invalid) => {
                warn!(line = invalid.line, reason = %invalid.reason, "skipping invalid row");
                invalid_rows.push(invalid);
            }
        }
    }

    Ok(PreparedBatch {
        header,
        delimiter,
        records,
        invalid_rows,
    })
}

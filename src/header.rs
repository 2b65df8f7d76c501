use tracing::debug;

use crate::error::IngestError;

/// Label of the date column; its presence marks the true header row.
pub const HEADER_ANCHOR: &str = "Date (YYYY/MM/DD)";

pub const DEFAULT_SCAN_ROWS: usize = 50;

const DELIMITER_CANDIDATES: [u8; 4] = [b'\t', b',', b';', b'|'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLocation {
    /// Zero-based line index of the header row.
    pub row_index: usize,
    /// Byte offset where the header row starts in the file content.
    pub byte_offset: usize,
    pub columns: Vec<String>,
}

/// Picks the delimiter with the most occurrences over the first five
/// non-empty lines; comma when none of the candidates appear.
pub fn detect_delimiter(content: &str) -> u8 {
    let mut counts = [0usize; DELIMITER_CANDIDATES.len()];

    for line in content.lines().filter(|line| !line.trim().is_empty()).take(5) {
        for (slot, candidate) in counts.iter_mut().zip(DELIMITER_CANDIDATES) {
            *slot += line.bytes().filter(|b| *b == candidate).count();
        }
    }

    let mut best = 0;
    for (idx, count) in counts.iter().enumerate() {
        if *count > counts[best] {
            best = idx;
        }
    }

    if counts[best] == 0 {
        b','
    } else {
        DELIMITER_CANDIDATES[best]
    }
}

pub fn detect_header(
    content: &str,
    delimiter: u8,
    scan_rows: usize,
) -> Result<HeaderLocation, IngestError> {
    let anchor = HEADER_ANCHOR.to_lowercase();
    let mut byte_offset = 0usize;

    for (row_index, line) in content.split_inclusive('\n').take(scan_rows).enumerate() {
        if line.to_lowercase().contains(&anchor) {
            let columns = split_header_line(line, delimiter)?;
            debug!(row_index, columns = columns.len(), "header row located");
            return Ok(HeaderLocation {
                row_index,
                byte_offset,
                columns,
            });
        }
        byte_offset += line.len();
    }

    Err(IngestError::HeaderNotFound {
        anchor: HEADER_ANCHOR,
        scanned: content.split_inclusive('\n').take(scan_rows).count(),
    })
}

fn split_header_line(line: &str, delimiter: u8) -> Result<Vec<String>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(line.as_bytes());

    let mut record = csv::StringRecord::new();
    reader.read_record(&mut record)?;
    Ok(record.iter().map(str::to_string).collect())
}

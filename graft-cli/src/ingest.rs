//! Spreadsheet ingestion: every sheet of every workbook, concatenated
//! into one ordered row sequence.
//!
//! Row 1 of each sheet is the header and must match across sheets and
//! files. Fully empty rows are dropped, as are exact duplicate rows
//! (first occurrence kept). Surviving rows are indexed 0..n in
//! concatenation order; that index orders the result logs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use calamine::{Data, Reader, open_workbook_auto};
use graft_types::{CellValue, Row};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Result type for ingestion.
pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to open workbook {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    #[error("failed to read sheet '{sheet}' of {path}: {source}")]
    Sheet {
        path: PathBuf,
        sheet: String,
        #[source]
        source: calamine::Error,
    },

    #[error("sheet '{sheet}' of {path} has no header row")]
    MissingHeader { path: PathBuf, sheet: String },

    #[error("sheet '{sheet}' of {path} has a different header than the first sheet")]
    HeaderMismatch { path: PathBuf, sheet: String },

    #[error("no input rows survived ingestion")]
    Empty,
}

/// Counters for the ingestion log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub sheets: usize,
    pub rows: usize,
    pub blank_dropped: usize,
    pub duplicates_dropped: usize,
}

/// The concatenated, deduplicated input table.
#[derive(Debug)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub stats: IngestStats,
}

/// Reads every sheet of every workbook into one table.
pub fn read_tables(paths: &[PathBuf]) -> IngestResult<Table> {
    let mut headers: Option<Vec<String>> = None;
    let mut rows: Vec<Row> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut stats = IngestStats::default();

    for path in paths {
        read_workbook(path, &mut headers, &mut rows, &mut seen, &mut stats)?;
    }

    let Some(headers) = headers else {
        return Err(IngestError::Empty);
    };
    if rows.is_empty() {
        return Err(IngestError::Empty);
    }

    info!(
        files = paths.len(),
        sheets = stats.sheets,
        rows = stats.rows,
        blank_dropped = stats.blank_dropped,
        duplicates_dropped = stats.duplicates_dropped,
        "ingested input table"
    );
    Ok(Table { headers, rows, stats })
}

fn read_workbook(
    path: &Path,
    headers: &mut Option<Vec<String>>,
    rows: &mut Vec<Row>,
    seen: &mut HashSet<String>,
    stats: &mut IngestStats,
) -> IngestResult<()> {
    let mut workbook = open_workbook_auto(path).map_err(|source| IngestError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let sheet_names = workbook.sheet_names().to_owned();
    for sheet in sheet_names {
        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|source| IngestError::Sheet {
                path: path.to_path_buf(),
                sheet: sheet.clone(),
                source: source.into(),
            })?;
        let mut sheet_rows = range.rows();

        let Some(header_row) = sheet_rows.next() else {
            return Err(IngestError::MissingHeader {
                path: path.to_path_buf(),
                sheet,
            });
        };
        let sheet_headers: Vec<String> = header_row
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();
        match headers {
            None => *headers = Some(sheet_headers),
            Some(expected) if *expected != sheet_headers => {
                return Err(IngestError::HeaderMismatch {
                    path: path.to_path_buf(),
                    sheet,
                });
            }
            Some(_) => {}
        }
        let header = headers.as_deref().unwrap_or_default();

        stats.sheets += 1;
        for cells in sheet_rows {
            let row = convert_row(header, cells, stats.rows);
            if row.is_blank() {
                stats.blank_dropped += 1;
                continue;
            }
            if !seen.insert(row_signature(&row)) {
                stats.duplicates_dropped += 1;
                continue;
            }
            rows.push(row);
            stats.rows += 1;
        }
        debug!(path = %path.display(), sheet = %sheet, rows_so_far = rows.len(), "read sheet");
    }
    Ok(())
}

/// Duplicate-detection key for a row, independent of its index. Cell
/// values are separated from column names and from each other with
/// control characters no spreadsheet cell can contain.
fn row_signature(row: &Row) -> String {
    use std::fmt::Write;

    let mut signature = String::new();
    for (column, value) in &row.cells {
        let _ = write!(signature, "{column}\u{1f}");
        match value {
            CellValue::Text(text) => {
                let _ = write!(signature, "t{text}");
            }
            CellValue::Number(n) => {
                let _ = write!(signature, "n{n}");
            }
            CellValue::Bool(b) => {
                let _ = write!(signature, "b{b}");
            }
            CellValue::Empty => signature.push('e'),
        }
        signature.push('\u{1e}');
    }
    signature
}

fn convert_row(headers: &[String], cells: &[Data], index: usize) -> Row {
    let pairs = headers.iter().enumerate().filter_map(|(i, column)| {
        if column.is_empty() {
            return None;
        }
        let value = cells.get(i).map_or(CellValue::Empty, convert_cell);
        Some((column.clone(), value))
    });
    Row::from_pairs(index, pairs)
}

fn convert_cell(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(text) => {
            if text.trim().is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(text.clone())
            }
        }
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(text) | Data::DurationIso(text) => CellValue::Text(text.clone()),
        Data::Error(e) => {
            warn!(error = ?e, "cell holds a spreadsheet error, treating as empty");
            CellValue::Empty
        }
    }
}

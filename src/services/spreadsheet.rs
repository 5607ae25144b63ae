//! Spreadsheet input and output.
//!
//! Streams CSV input row by row; XLSX sheets are read through calamine and
//! walked without materialising typed records up front. Column mapping is
//! explicit: the director-name column is named at the boundary and every
//! other column rides through untouched.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use calamine::{Data, Reader as CalamineReader, open_workbook_auto};

use crate::models::{LeadRecord, LeadResult};
use crate::utils::StringExt;

/// Appended output columns, in order.
const OUTPUT_COLUMNS: [&str; 7] =
    ["category", "confidence", "method", "provider", "latency_ms", "processing_status", "error_kind"];

#[derive(Debug, thiserror::Error)]
pub enum SpreadsheetError {
    #[error("spreadsheet io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("xlsx error: {0}")]
    Xlsx(#[from] calamine::Error),

    #[error("input has no '{0}' column")]
    ColumnMissing(String),

    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error("input sheet is empty")]
    EmptySheet,
}

/// One read row: either a typed record or a row-local defect the runner
/// records as `input.malformed_row`.
#[derive(Debug)]
pub enum RowRead {
    Record(LeadRecord),
    Malformed { row_index: i64, message: String },
}

enum ReaderBackend {
    Csv(csv::StringRecordsIntoIter<File>),
    Xlsx { rows: std::vec::IntoIter<Vec<String>> },
}

impl std::fmt::Debug for ReaderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderBackend::Csv(_) => f.write_str("ReaderBackend::Csv(..)"),
            ReaderBackend::Xlsx { .. } => f.write_str("ReaderBackend::Xlsx {{ .. }}"),
        }
    }
}

/// Streaming reader over an input spreadsheet.
#[derive(Debug)]
pub struct LeadReader {
    headers: Vec<String>,
    name_column_index: usize,
    backend: ReaderBackend,
    next_row_index: i64,
}

impl LeadReader {
    /// Open a CSV or XLSX input and resolve the column mapping.
    pub fn open(path: &Path, name_column: &str) -> Result<Self, SpreadsheetError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Self::open_csv(path, name_column),
            "xlsx" | "xls" | "xlsm" => Self::open_xlsx(path, name_column),
            other => Err(SpreadsheetError::UnsupportedFormat(other.to_string())),
        }
    }

    fn open_csv(path: &Path, name_column: &str) -> Result<Self, SpreadsheetError> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        let name_column_index = resolve_column(&headers, name_column)?;

        Ok(Self {
            headers,
            name_column_index,
            backend: ReaderBackend::Csv(reader.into_records()),
            next_row_index: 0,
        })
    }

    fn open_xlsx(path: &Path, name_column: &str) -> Result<Self, SpreadsheetError> {
        let mut workbook = open_workbook_auto(path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(SpreadsheetError::EmptySheet)??;

        let mut rows = range.rows();
        let headers: Vec<String> = rows
            .next()
            .ok_or(SpreadsheetError::EmptySheet)?
            .iter()
            .map(cell_to_string)
            .collect();
        let name_column_index = resolve_column(&headers, name_column)?;

        let data: Vec<Vec<String>> =
            rows.map(|row| row.iter().map(cell_to_string).collect()).collect();

        Ok(Self {
            headers,
            name_column_index,
            backend: ReaderBackend::Xlsx { rows: data.into_iter() },
            next_row_index: 0,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Read the next row. `Ok(None)` is end of input.
    pub fn next_row(&mut self) -> Result<Option<RowRead>, SpreadsheetError> {
        let row_index = self.next_row_index;

        let fields: Vec<String> = match &mut self.backend {
            ReaderBackend::Csv(records) => match records.next() {
                None => return Ok(None),
                Some(Ok(record)) => record.iter().map(|f| f.to_string()).collect(),
                Some(Err(e)) => {
                    self.next_row_index += 1;
                    return Ok(Some(RowRead::Malformed { row_index, message: e.to_string() }));
                },
            },
            ReaderBackend::Xlsx { rows } => match rows.next() {
                None => return Ok(None),
                Some(fields) => fields,
            },
        };

        self.next_row_index += 1;

        if fields.len() <= self.name_column_index {
            return Ok(Some(RowRead::Malformed {
                row_index,
                message: format!(
                    "row has {} fields, name column is at index {}",
                    fields.len(),
                    self.name_column_index
                ),
            }));
        }

        let director_name = fields[self.name_column_index].trimmed();
        let mut extra_fields = BTreeMap::new();
        for (i, value) in fields.iter().enumerate() {
            if i == self.name_column_index {
                continue;
            }
            let key = self
                .headers
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("column_{}", i));
            extra_fields.insert(key, value.clone());
        }

        Ok(Some(RowRead::Record(LeadRecord { row_index, director_name, extra_fields })))
    }
}

fn resolve_column(headers: &[String], name_column: &str) -> Result<usize, SpreadsheetError> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name_column))
        .ok_or_else(|| SpreadsheetError::ColumnMissing(name_column.to_string()))
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// Export
// ============================================================================

/// Write the output file: the input shape plus the appended classification
/// columns, populated from committed results keyed by row index.
///
/// Runs off the hot path; it re-reads the input so it can run long after
/// the job finished.
pub fn write_output(
    input_path: &Path,
    output_path: &Path,
    name_column: &str,
    results: &[LeadResult],
) -> Result<u64, SpreadsheetError> {
    let by_row: BTreeMap<i64, &LeadResult> =
        results.iter().map(|r| (r.row_index, r)).collect();

    let mut reader = LeadReader::open(input_path, name_column)?;

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_writer(BufWriter::new(File::create(output_path)?));

    let mut header_row: Vec<String> = reader.headers().to_vec();
    header_row.extend(OUTPUT_COLUMNS.iter().map(|c| c.to_string()));
    writer.write_record(&header_row)?;

    let headers = reader.headers().to_vec();
    let mut written = 0u64;

    while let Some(row) = reader.next_row()? {
        let (row_index, mut fields) = match row {
            RowRead::Record(record) => {
                // Reassemble the original column order
                let mut fields = Vec::with_capacity(headers.len());
                for header in &headers {
                    if header.trim().eq_ignore_ascii_case(name_column) {
                        fields.push(record.director_name.clone());
                    } else {
                        fields.push(
                            record.extra_fields.get(header).cloned().unwrap_or_default(),
                        );
                    }
                }
                (record.row_index, fields)
            },
            RowRead::Malformed { row_index, .. } => (row_index, vec![String::new(); headers.len()]),
        };

        match by_row.get(&row_index) {
            Some(result) => {
                fields.push(result.category.clone().unwrap_or_default());
                fields.push(
                    result.confidence.map(|c| format!("{:.2}", c)).unwrap_or_default(),
                );
                fields.push(result.method.clone().unwrap_or_default());
                fields.push(result.provider.clone().unwrap_or_default());
                fields.push(result.latency_ms.to_string());
                fields.push(result.processing_status.clone());
                fields.push(result.error_kind.clone().unwrap_or_default());
            },
            None => {
                fields.extend(std::iter::repeat_n(String::new(), OUTPUT_COLUMNS.len()));
            },
        }

        writer.write_record(&fields)?;
        written += 1;
    }

    writer.flush()?;
    Ok(written)
}

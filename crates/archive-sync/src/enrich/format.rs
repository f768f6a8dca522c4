//! CSV parsing and format validation.
//!
//! Row numbers are spreadsheet rows: the header is row 1, the first data
//! record is row 2.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use super::EnrichError;
use crate::records::{FieldUpdate, MetadataField};

/// One data row reduced to its key and the non-empty known cells.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRow {
    pub row: usize,
    pub key: String,
    pub updates: Vec<FieldUpdate>,
}

#[derive(Debug, Clone)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub key_column: String,
    /// Field per header position; `None` for the key and unknown columns.
    pub columns: Vec<Option<MetadataField>>,
    pub ignored_columns: Vec<String>,
    pub rows: Vec<CsvRow>,
}

impl ParsedCsv {
    /// Distinct non-empty keys in first-seen order.
    pub fn keys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|r| !r.key.is_empty())
            .filter(|r| seen.insert(r.key.as_str()))
            .map(|r| r.key.clone())
            .collect()
    }
}

fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase().replace(['-', ' '], "_")
}

/// Parses CSV text (quote-aware, trimmed cells) and locates the key column.
///
/// Short rows are accepted; missing trailing cells count as empty.
pub fn parse_csv(content: &str, key_column: &str) -> Result<ParsedCsv, EnrichError> {
    // Spreadsheet exports often carry a UTF-8 BOM.
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let wanted = normalize_header(key_column);
    let key_index = headers
        .iter()
        .position(|h| normalize_header(h) == wanted)
        .ok_or_else(|| EnrichError::MissingKeyColumn(key_column.to_string()))?;

    let mut columns = Vec::with_capacity(headers.len());
    let mut ignored_columns = Vec::new();
    let mut mapped = HashSet::new();
    for (i, header) in headers.iter().enumerate() {
        if i == key_index {
            columns.push(None);
            continue;
        }
        match MetadataField::from_header(header) {
            Some(field) if mapped.insert(field) => columns.push(Some(field)),
            _ => {
                ignored_columns.push(header.clone());
                columns.push(None);
            }
        }
    }

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let key = record.get(key_index).unwrap_or("").to_string();
        let updates = columns
            .iter()
            .enumerate()
            .filter_map(|(i, field)| {
                let field = (*field)?;
                let value = record.get(i)?;
                if value.is_empty() {
                    None
                } else {
                    Some((field, value.to_string()))
                }
            })
            .collect();
        rows.push(CsvRow {
            row: index + 2,
            key,
            updates,
        });
    }

    Ok(ParsedCsv {
        headers,
        key_column: key_column.to_string(),
        columns,
        ignored_columns,
        rows,
    })
}

/// Diagnostics returned to the client after format validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatReport {
    pub valid: bool,
    pub total_rows: usize,
    pub empty_key_rows: Vec<usize>,
    /// Key → every row it appears on, for keys seen more than once.
    pub duplicate_keys: BTreeMap<String, Vec<usize>>,
    pub ignored_columns: Vec<String>,
}

/// Checks for empty and duplicated keys. Valid only if there are neither.
pub fn validate_format(parsed: &ParsedCsv) -> FormatReport {
    let mut empty_key_rows = Vec::new();
    let mut rows_by_key: BTreeMap<String, Vec<usize>> = BTreeMap::new();

    for row in &parsed.rows {
        if row.key.is_empty() {
            empty_key_rows.push(row.row);
        } else {
            rows_by_key.entry(row.key.clone()).or_default().push(row.row);
        }
    }
    rows_by_key.retain(|_, rows| rows.len() > 1);

    FormatReport {
        valid: empty_key_rows.is_empty() && rows_by_key.is_empty(),
        total_rows: parsed.rows.len(),
        empty_key_rows,
        duplicate_keys: rows_by_key,
        ignored_columns: parsed.ignored_columns.clone(),
    }
}

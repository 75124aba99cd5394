//! Spreadsheet parsing
//!
//! CSV goes through the `csv` crate, XLSX/XLS through `calamine`. Both end up
//! in a `ParsedSheet`: the header row of the first sheet and one `RawRow` per
//! non-empty data row.

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Data, Range, Reader, Xls, Xlsx};
use chrono::NaiveDateTime;
use tracing::debug;

use crate::error::ImportError;
use crate::types::{CellValue, FileFormat, ParsedSheet, RawRow, UploadedFile};

/// Parse an uploaded file. Unsupported extensions fail before reading any bytes.
pub fn parse(file: &UploadedFile) -> Result<ParsedSheet, ImportError> {
    let sheet = match file.format()? {
        FileFormat::Csv => parse_csv(&file.filename, &file.bytes)?,
        FileFormat::Xlsx => parse_workbook::<Xlsx<_>>(&file.filename, &file.bytes)?,
        FileFormat::Xls => parse_workbook::<Xls<_>>(&file.filename, &file.bytes)?,
    };

    debug!(
        "Parsed '{}': {} columns, {} rows",
        file.filename,
        sheet.headers.len(),
        sheet.rows.len()
    );
    Ok(sheet)
}

// =============================================================================
// CSV
// =============================================================================

fn parse_csv(filename: &str, bytes: &[u8]) -> Result<ParsedSheet, ImportError> {
    let content = std::str::from_utf8(bytes)
        .map_err(|e| ImportError::parse_failure(filename, format!("file is not UTF-8 text: {}", e)))?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(detect_delimiter(content))
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut builder = SheetBuilder::default();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| ImportError::parse_failure(filename, e))?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 1);

        let cells = record
            .iter()
            .map(|value| {
                let value = value.trim();
                (!value.is_empty()).then(|| CellValue::Text(value.to_string()))
            })
            .collect();
        builder.push(line, cells);
    }

    Ok(builder.finish())
}

/// Most frequent of `,` `;` `\t` in the header line outside quotes; `,` by default.
/// The header is the first line with any content, matching `SheetBuilder`.
fn detect_delimiter(content: &str) -> u8 {
    let header = content
        .lines()
        .find(|line| {
            line.chars()
                .any(|c| !c.is_whitespace() && !matches!(c, ',' | ';' | '"'))
        })
        .unwrap_or_default();
    let mut counts = [(b',', 0usize), (b';', 0), (b'\t', 0)];
    let mut in_quotes = false;

    for ch in header.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => counts[0].1 += 1,
            ';' if !in_quotes => counts[1].1 += 1,
            '\t' if !in_quotes => counts[2].1 += 1,
            _ => {}
        }
    }

    let mut best = counts[0];
    for candidate in &counts[1..] {
        if candidate.1 > best.1 {
            best = *candidate;
        }
    }
    best.0
}

// =============================================================================
// XLSX / XLS
// =============================================================================

fn parse_workbook<R>(filename: &str, bytes: &[u8]) -> Result<ParsedSheet, ImportError>
where
    R: Reader<Cursor<Vec<u8>>>,
    R::Error: std::fmt::Display,
{
    let mut workbook =
        R::new(Cursor::new(bytes.to_vec())).map_err(|e| ImportError::parse_failure(filename, e))?;

    let range = match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => range,
        Some(Err(e)) => return Err(ImportError::parse_failure(filename, e)),
        None => return Ok(ParsedSheet::default()),
    };

    Ok(sheet_from_range(&range))
}

fn sheet_from_range(range: &Range<Data>) -> ParsedSheet {
    // Ranges start at the first used cell, not necessarily A1
    let first_line = range.start().map(|(row, _)| row as usize + 1).unwrap_or(1);

    let mut builder = SheetBuilder::default();
    for (idx, row) in range.rows().enumerate() {
        let cells = row.iter().map(cell_value).collect();
        builder.push(first_line + idx, cells);
    }
    builder.finish()
}

fn cell_value(cell: &Data) -> Option<CellValue> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| CellValue::Text(s.to_string()))
        }
        Data::Int(i) => Some(CellValue::Number(*i as f64)),
        Data::Float(f) => Some(CellValue::Number(*f)),
        Data::Bool(b) => Some(CellValue::Bool(*b)),
        Data::DateTime(dt) => Some(
            dt.as_datetime()
                .map(CellValue::Date)
                .unwrap_or_else(|| CellValue::Number(dt.as_f64())),
        ),
        Data::DateTimeIso(s) => Some(
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .map(CellValue::Date)
                .unwrap_or_else(|_| CellValue::Text(s.clone())),
        ),
        Data::DurationIso(s) => Some(CellValue::Text(s.clone())),
    }
}

// =============================================================================
// ROW ASSEMBLY
// =============================================================================

/// Turns positional cells into header-keyed rows. The first non-empty line is the header.
#[derive(Default)]
struct SheetBuilder {
    headers: Option<Vec<Option<String>>>,
    rows: Vec<RawRow>,
}

impl SheetBuilder {
    fn push(&mut self, line: usize, cells: Vec<Option<CellValue>>) {
        if self.headers.is_none() {
            if cells.iter().any(Option::is_some) {
                self.headers = Some(
                    cells
                        .into_iter()
                        .map(|cell| cell.map(|v| v.to_text()).filter(|h| !h.is_empty()))
                        .collect(),
                );
            }
            return;
        }

        let headers = match &self.headers {
            Some(headers) => headers,
            None => return,
        };

        let mut values = HashMap::new();
        for (header, cell) in headers.iter().zip(cells) {
            if let (Some(header), Some(cell)) = (header, cell) {
                // Duplicate header text: the leftmost column keeps the value
                values.entry(header.clone()).or_insert(cell);
            }
        }

        if values.is_empty() {
            return;
        }

        let row = self.rows.len() + 1;
        self.rows.push(RawRow { row, line, cells: values });
    }

    fn finish(self) -> ParsedSheet {
        ParsedSheet {
            headers: self.headers.unwrap_or_default().into_iter().flatten().collect(),
            rows: self.rows,
        }
    }
}

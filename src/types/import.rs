//! Guest import types: uploaded files, raw rows, column mapping and results

use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::ImportError;
use super::guest::GuestRecord;

// =============================================================================
// UPLOADED FILE
// =============================================================================

/// Accepted spreadsheet formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Xlsx,
    Xls,
}

impl FileFormat {
    /// Detect format from the filename extension (case-insensitive)
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.trim().to_lowercase().as_str() {
            "csv" => Some(FileFormat::Csv),
            "xlsx" => Some(FileFormat::Xlsx),
            "xls" => Some(FileFormat::Xls),
            _ => None,
        }
    }
}

/// A file handed over by the file picker. Consumed once by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    pub fn format(&self) -> Result<FileFormat, ImportError> {
        FileFormat::from_filename(&self.filename).ok_or_else(|| ImportError::UnsupportedFormat {
            filename: self.filename.clone(),
        })
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

// =============================================================================
// RAW ROWS
// =============================================================================

/// Scalar cell value as read from the sheet
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
}

impl CellValue {
    /// Text rendering used for string fields
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Date(dt) => {
                if dt.time() == NaiveTime::MIN {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.trim().is_empty())
    }
}

/// Integral numbers print without a fractional part (phone numbers from xlsx)
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// One non-empty data row of the sheet
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based position among data rows (header excluded)
    pub row: usize,
    /// 1-based physical line in the sheet, header included
    pub line: usize,
    /// Header text -> cell value; blank cells are absent
    pub cells: HashMap<String, CellValue>,
}

impl RawRow {
    pub fn get(&self, header: &str) -> Option<&CellValue> {
        self.cells.get(header).filter(|v| !v.is_blank())
    }
}

/// Parser output: header row plus ordered data rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSheet {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

// =============================================================================
// COLUMN MAPPING
// =============================================================================

/// Guest attribute the importer recognizes regardless of header wording
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalField {
    Name,
    Email,
    Phone,
    RsvpStatus,
    ArrivalDate,
    ArrivalTime,
    DepartureDate,
    DepartureTime,
    RoomNumber,
    RoomType,
    DietaryRestrictions,
    PlusOne,
    TransportNeeded,
    SpecialRequests,
    Events,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 15] = [
        CanonicalField::Name,
        CanonicalField::Email,
        CanonicalField::Phone,
        CanonicalField::RsvpStatus,
        CanonicalField::ArrivalDate,
        CanonicalField::ArrivalTime,
        CanonicalField::DepartureDate,
        CanonicalField::DepartureTime,
        CanonicalField::RoomNumber,
        CanonicalField::RoomType,
        CanonicalField::DietaryRestrictions,
        CanonicalField::PlusOne,
        CanonicalField::TransportNeeded,
        CanonicalField::SpecialRequests,
        CanonicalField::Events,
    ];

    /// camelCase key, same as the serialized form
    pub fn key(&self) -> &'static str {
        match self {
            CanonicalField::Name => "name",
            CanonicalField::Email => "email",
            CanonicalField::Phone => "phone",
            CanonicalField::RsvpStatus => "rsvpStatus",
            CanonicalField::ArrivalDate => "arrivalDate",
            CanonicalField::ArrivalTime => "arrivalTime",
            CanonicalField::DepartureDate => "departureDate",
            CanonicalField::DepartureTime => "departureTime",
            CanonicalField::RoomNumber => "roomNumber",
            CanonicalField::RoomType => "roomType",
            CanonicalField::DietaryRestrictions => "dietaryRestrictions",
            CanonicalField::PlusOne => "plusOne",
            CanonicalField::TransportNeeded => "transportNeeded",
            CanonicalField::SpecialRequests => "specialRequests",
            CanonicalField::Events => "events",
        }
    }
}

/// Canonical field -> header found in the file. Unmapped fields are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping(BTreeMap<CanonicalField, String>);

impl ColumnMapping {
    pub fn header(&self, field: CanonicalField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    #[cfg(test)]
    pub fn is_mapped(&self, field: CanonicalField) -> bool {
        self.0.contains_key(&field)
    }

    /// Maps `field` unless it already has a header; returns whether it was taken
    pub fn insert_first(&mut self, field: CanonicalField, header: &str) -> bool {
        if self.0.contains_key(&field) {
            return false;
        }
        self.0.insert(field, header.to_string());
        true
    }

    /// Cell of `row` under the header mapped to `field`, ignoring blanks
    pub fn cell<'a>(&self, row: &'a RawRow, field: CanonicalField) -> Option<&'a CellValue> {
        self.header(field).and_then(|h| row.get(h))
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalField, &str)> {
        self.0.iter().map(|(f, h)| (*f, h.as_str()))
    }

    pub fn unmapped(&self) -> Vec<CanonicalField> {
        CanonicalField::ALL
            .iter()
            .copied()
            .filter(|f| !self.0.contains_key(f))
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// Why a row was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvalidReason {
    MissingName,
    InvalidEmail,
}

impl InvalidReason {
    pub fn message(&self) -> &'static str {
        match self {
            InvalidReason::MissingName => "Missing name",
            InvalidReason::InvalidEmail => "Missing or invalid email address",
        }
    }
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Rejected row kept for operator review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidRow {
    pub row: usize,
    pub line: usize,
    pub reason: InvalidReason,
    pub name: Option<String>,
    /// Canonical key -> interpreted text of every mapped non-empty cell
    pub values: BTreeMap<String, String>,
}

/// Outcome of one upload attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub filename: String,
    pub format: FileFormat,
    pub total_rows: usize,
    pub valid_guests: Vec<GuestRecord>,
    pub invalid_rows: Vec<InvalidRow>,
    pub mapping: ColumnMapping,
    /// Rows with a non-empty mapped cell, per field, valid or not
    pub field_hits: BTreeMap<CanonicalField, usize>,
}

/// Completeness line for one canonical field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCompleteness {
    pub field: CanonicalField,
    pub header: Option<String>,
    pub hits: usize,
    pub total: usize,
}

/// Counts exposed to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub filename: String,
    pub total_rows: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub completeness: Vec<FieldCompleteness>,
    pub unmapped_fields: Vec<CanonicalField>,
}

//! Row validation and type coercion
//!
//! `validate_row` is a pure function of (row, mapping, id). Required fields are
//! checked name first, then email; only the first failure is reported.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::types::{
    CanonicalField, CellValue, ColumnMapping, GuestRecord, InvalidReason, InvalidRow, RawRow,
    RsvpStatus, DEFAULT_DIETARY_RESTRICTIONS,
};

/// Validation result for one row
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Valid(GuestRecord),
    Invalid(InvalidRow),
}

pub fn validate_row(row: &RawRow, mapping: &ColumnMapping, id: u32) -> RowOutcome {
    let name = match text(row, mapping, CanonicalField::Name) {
        Some(name) => name,
        None => return RowOutcome::Invalid(reject(row, mapping, InvalidReason::MissingName)),
    };

    let email = match text(row, mapping, CanonicalField::Email) {
        Some(email) if email.contains('@') => email.to_lowercase(),
        _ => return RowOutcome::Invalid(reject(row, mapping, InvalidReason::InvalidEmail)),
    };

    let rsvp_status = text(row, mapping, CanonicalField::RsvpStatus)
        .and_then(|s| RsvpStatus::parse(&s))
        .unwrap_or_default();

    let transport_needed = mapping
        .cell(row, CanonicalField::TransportNeeded)
        .map(is_truthy)
        .unwrap_or(false);

    let events = text(row, mapping, CanonicalField::Events)
        .map(|s| split_events(&s))
        .unwrap_or_default();

    RowOutcome::Valid(GuestRecord {
        id,
        name,
        email,
        phone: text(row, mapping, CanonicalField::Phone),
        rsvp_status,
        arrival_date: interpreted(row, mapping, CanonicalField::ArrivalDate),
        arrival_time: interpreted(row, mapping, CanonicalField::ArrivalTime),
        departure_date: interpreted(row, mapping, CanonicalField::DepartureDate),
        departure_time: interpreted(row, mapping, CanonicalField::DepartureTime),
        room_number: text(row, mapping, CanonicalField::RoomNumber),
        room_type: text(row, mapping, CanonicalField::RoomType),
        dietary_restrictions: text(row, mapping, CanonicalField::DietaryRestrictions)
            .unwrap_or_else(|| DEFAULT_DIETARY_RESTRICTIONS.to_string()),
        plus_one: text(row, mapping, CanonicalField::PlusOne),
        transport_needed,
        special_requests: text(row, mapping, CanonicalField::SpecialRequests),
        events,
    })
}

fn reject(row: &RawRow, mapping: &ColumnMapping, reason: InvalidReason) -> InvalidRow {
    let mut values = BTreeMap::new();
    for (field, header) in mapping.iter() {
        if let Some(cell) = row.get(header) {
            values.insert(field.key().to_string(), interpret(field, cell));
        }
    }

    InvalidRow {
        row: row.row,
        line: row.line,
        reason,
        name: text(row, mapping, CanonicalField::Name),
        values,
    }
}

// =============================================================================
// FIELD EXTRACTION
// =============================================================================

/// Trimmed text of the mapped cell; blank is `None`
fn text(row: &RawRow, mapping: &ColumnMapping, field: CanonicalField) -> Option<String> {
    mapping
        .cell(row, field)
        .map(CellValue::to_text)
        .filter(|s| !s.is_empty())
}

fn interpreted(row: &RawRow, mapping: &ColumnMapping, field: CanonicalField) -> Option<String> {
    mapping
        .cell(row, field)
        .map(|cell| interpret(field, cell))
        .filter(|s| !s.is_empty())
}

/// Field-aware text rendering: dates as `YYYY-MM-DD`, times as `HH:MM`
pub fn interpret(field: CanonicalField, cell: &CellValue) -> String {
    match field {
        CanonicalField::ArrivalDate | CanonicalField::DepartureDate => date_text(cell),
        CanonicalField::ArrivalTime | CanonicalField::DepartureTime => time_text(cell),
        _ => cell.to_text(),
    }
}

fn date_text(cell: &CellValue) -> String {
    match cell {
        CellValue::Date(dt) => dt.date().format("%Y-%m-%d").to_string(),
        CellValue::Text(s) => parse_date(s)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| s.trim().to_string()),
        other => other.to_text(),
    }
}

fn time_text(cell: &CellValue) -> String {
    match cell {
        CellValue::Date(dt) => dt.time().format("%H:%M").to_string(),
        CellValue::Text(s) => parse_time(s)
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_else(|| s.trim().to_string()),
        other => other.to_text(),
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    // Try YYYY-MM-DD
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    // Try DD.MM.YYYY
    if let Ok(date) = NaiveDate::parse_from_str(s, "%d.%m.%Y") {
        return Some(date);
    }
    // Try DD/MM/YYYY
    if let Ok(date) = NaiveDate::parse_from_str(s, "%d/%m/%Y") {
        return Some(date);
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.date())
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    ["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M%p"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

fn is_truthy(cell: &CellValue) -> bool {
    match cell {
        CellValue::Bool(b) => *b,
        other => matches!(other.to_text().to_lowercase().as_str(), "yes" | "true" | "1"),
    }
}

fn split_events(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}

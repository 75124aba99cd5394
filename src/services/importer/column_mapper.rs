//! Header recognition
//!
//! Each canonical field has a fixed set of accepted header spellings. Headers
//! are compared after normalization (lowercase, `_`/`-` read as spaces,
//! whitespace collapsed), so "Guest_Name", " guest  name " and "GUEST-NAME"
//! all land on `name`.

use crate::types::{CanonicalField, ColumnMapping};

/// Accepted header spellings per field, already normalized
fn aliases(field: CanonicalField) -> &'static [&'static str] {
    match field {
        CanonicalField::Name => &["name", "full name", "guest name", "guest"],
        CanonicalField::Email => &["email", "e mail", "email address", "e mail address", "mail"],
        CanonicalField::Phone => &["phone", "phone number", "mobile", "mobile number", "telephone", "contact number"],
        CanonicalField::RsvpStatus => &["rsvp status", "rsvp", "status", "attendance"],
        CanonicalField::ArrivalDate => &["arrival date", "arrival", "check in date", "check in"],
        CanonicalField::ArrivalTime => &["arrival time", "check in time"],
        CanonicalField::DepartureDate => &["departure date", "departure", "check out date", "check out"],
        CanonicalField::DepartureTime => &["departure time", "check out time"],
        CanonicalField::RoomNumber => &["room number", "room no", "room #"],
        CanonicalField::RoomType => &["room type", "room", "accommodation"],
        CanonicalField::DietaryRestrictions => &["dietary restrictions", "dietary requirements", "dietary", "diet"],
        CanonicalField::PlusOne => &["plus one", "plus 1", "+1", "companion"],
        CanonicalField::TransportNeeded => &["transport needed", "transport", "needs transport", "transportation"],
        CanonicalField::SpecialRequests => &["special requests", "special request", "requests", "notes"],
        CanonicalField::Events => &["events", "event", "functions", "ceremonies"],
    }
}

/// Lowercase, `_`/`-` as spaces, single spaces, trimmed
pub fn normalize_header(header: &str) -> String {
    header
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical field a single header stands for, if any
pub fn field_for_header(header: &str) -> Option<CanonicalField> {
    let normalized = normalize_header(header);
    if normalized.is_empty() {
        return None;
    }
    CanonicalField::ALL
        .iter()
        .copied()
        .find(|field| aliases(*field).contains(&normalized.as_str()))
}

/// Build the mapping for a header row. Headers are scanned in file order and
/// a field keeps the first header that matches it.
pub fn map_columns<S: AsRef<str>>(headers: &[S]) -> ColumnMapping {
    let mut mapping = ColumnMapping::default();
    for header in headers {
        let header = header.as_ref();
        if let Some(field) = field_for_header(header) {
            mapping.insert_first(field, header);
        }
    }
    mapping
}

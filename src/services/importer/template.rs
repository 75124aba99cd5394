//! Downloadable CSV template for guest data

use anyhow::Result;

pub const TEMPLATE_FILENAME: &str = "guest-data-template.csv";

pub const TEMPLATE_HEADERS: [&str; 14] = [
    "Name",
    "Email",
    "Phone",
    "RSVP Status",
    "Arrival Date",
    "Arrival Time",
    "Departure Date",
    "Departure Time",
    "Room Type",
    "Dietary Restrictions",
    "Plus One",
    "Transport Needed",
    "Special Requests",
    "Events",
];

const EXAMPLE_ROWS: [[&str; 14]; 2] = [
    [
        "John Smith",
        "john@example.com",
        "+1 555 0100",
        "confirmed",
        "2025-02-14",
        "14:00",
        "2025-02-17",
        "11:00",
        "Deluxe",
        "Vegetarian",
        "Jane Smith",
        "Yes",
        "Late check-in",
        "Haldi, Mehendi, Wedding",
    ],
    [
        "Priya Sharma",
        "priya@example.com",
        "+91 98765 43210",
        "pending",
        "2025-02-15",
        "09:30",
        "2025-02-16",
        "18:00",
        "Standard",
        "",
        "",
        "No",
        "",
        "Wedding",
    ],
];

/// Render the template CSV
pub fn template_csv() -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(TEMPLATE_HEADERS)?;
    for row in EXAMPLE_ROWS {
        writer.write_record(row)?;
    }
    Ok(writer.into_inner()?)
}

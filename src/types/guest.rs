//! Guest types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// RSVP status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsvpStatus {
    Confirmed,
    Pending,
    Declined,
}

impl Default for RsvpStatus {
    fn default() -> Self {
        RsvpStatus::Pending
    }
}

impl RsvpStatus {
    /// Lenient parse; unknown values are `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "confirmed" => Some(RsvpStatus::Confirmed),
            "pending" => Some(RsvpStatus::Pending),
            "declined" => Some(RsvpStatus::Declined),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpStatus::Confirmed => "confirmed",
            RsvpStatus::Pending => "pending",
            RsvpStatus::Declined => "declined",
        }
    }
}

pub const DEFAULT_DIETARY_RESTRICTIONS: &str = "No restrictions";

/// Validated guest produced by the importer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestRecord {
    /// Sequential within one import result, starting at 1
    pub id: u32,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub rsvp_status: RsvpStatus,
    pub arrival_date: Option<String>,
    pub arrival_time: Option<String>,
    pub departure_date: Option<String>,
    pub departure_time: Option<String>,
    pub room_number: Option<String>,
    pub room_type: Option<String>,
    pub dietary_restrictions: String,
    pub plus_one: Option<String>,
    pub transport_needed: bool,
    pub special_requests: Option<String>,
    pub events: Vec<String>,
}

/// Guest entity as persisted for an event
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Guest {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub rsvp_status: String,
    pub arrival_date: Option<String>,
    pub arrival_time: Option<String>,
    pub departure_date: Option<String>,
    pub departure_time: Option<String>,
    pub room_number: Option<String>,
    pub room_type: Option<String>,
    pub dietary_restrictions: String,
    pub plus_one: Option<String>,
    pub transport_needed: bool,
    pub special_requests: Option<String>,
    pub events: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Mapping of an imported record to the stored guest id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredGuest {
    pub record_id: u32,
    pub guest_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsvp_parse_is_case_insensitive() {
        assert_eq!(RsvpStatus::parse("Confirmed"), Some(RsvpStatus::Confirmed));
        assert_eq!(RsvpStatus::parse(" DECLINED "), Some(RsvpStatus::Declined));
        assert_eq!(RsvpStatus::parse("maybe"), None);
    }

    #[test]
    fn test_rsvp_default_is_pending() {
        assert_eq!(RsvpStatus::default(), RsvpStatus::Pending);
    }

    #[test]
    fn test_guest_record_serializes_camel_case() {
        let guest = GuestRecord {
            id: 1,
            name: "John Smith".into(),
            email: "john@example.com".into(),
            phone: None,
            rsvp_status: RsvpStatus::Confirmed,
            arrival_date: None,
            arrival_time: None,
            departure_date: None,
            departure_time: None,
            room_number: None,
            room_type: None,
            dietary_restrictions: DEFAULT_DIETARY_RESTRICTIONS.into(),
            plus_one: None,
            transport_needed: true,
            special_requests: None,
            events: vec!["Wedding".into()],
        };
        let json = serde_json::to_string(&guest).unwrap();
        assert!(json.contains(r#""rsvpStatus":"confirmed""#));
        assert!(json.contains(r#""transportNeeded":true"#));
        assert!(json.contains(r#""dietaryRestrictions":"No restrictions""#));
    }
}

//! Import session types exchanged over NATS
//!
//! These types carry:
//! - Session status (the import state machine as seen by the client)
//! - Pipeline phase markers for progress updates
//! - Request/response payloads of the `wedding.guest.import.*` subjects

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{GuestRecord, ImportSummary, InvalidRow, StoredGuest};

// ==========================================================================
// Tests First (TDD)
// ==========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_percent_is_monotonic() {
        let phases = [
            ImportPhase::Reading,
            ImportPhase::Parsing,
            ImportPhase::Mapping,
            ImportPhase::Validating,
            ImportPhase::Summarizing,
            ImportPhase::Done,
        ];
        for pair in phases.windows(2) {
            assert!(pair[0].percent() < pair[1].percent());
        }
        assert_eq!(ImportPhase::Done.percent(), 100);
    }

    #[test]
    fn test_session_status_idle_serializes() {
        let json = serde_json::to_string(&ImportSessionStatus::Idle).unwrap();
        assert!(json.contains("idle"));
    }

    #[test]
    fn test_session_status_failed_serializes() {
        let status = ImportSessionStatus::Failed {
            code: "PARSE_FAILURE".to_string(),
            error: "bad".to_string(),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("failed"));
        assert!(json.contains("PARSE_FAILURE"));
    }

    #[test]
    fn test_session_status_file_selected_uses_camel_case() {
        let status = ImportSessionStatus::FileSelected {
            filename: "guests.csv".to_string(),
            size_bytes: 120,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("fileSelected"));
        assert!(json.contains("sizeBytes"));
    }

    #[test]
    fn test_select_file_request_parses() {
        let json = format!(
            r#"{{"eventId":"{}","filename":"guests.csv","contentBase64":"TmFtZQ=="}}"#,
            Uuid::nil()
        );
        let req: SelectFileRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req.filename, "guests.csv");
        assert_eq!(req.content_base64, "TmFtZQ==");
    }

    #[test]
    fn test_progress_update_carries_percent() {
        let update = ImportProgressUpdate::new(Uuid::nil(), ImportPhase::Validating);
        assert_eq!(update.percent, 70);
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains(r#""phase":"validating""#));
    }
}

// ==========================================================================
// Pipeline phases
// ==========================================================================

/// Sequential phase markers of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportPhase {
    Reading,
    Parsing,
    Mapping,
    Validating,
    Summarizing,
    Done,
}

impl ImportPhase {
    pub fn percent(&self) -> u8 {
        match self {
            ImportPhase::Reading => 10,
            ImportPhase::Parsing => 30,
            ImportPhase::Mapping => 50,
            ImportPhase::Validating => 70,
            ImportPhase::Summarizing => 90,
            ImportPhase::Done => 100,
        }
    }
}

/// Progress update published on `wedding.guest.import.progress.<eventId>`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgressUpdate {
    pub event_id: Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub phase: ImportPhase,
    pub percent: u8,
}

impl ImportProgressUpdate {
    pub fn new(event_id: Uuid, phase: ImportPhase) -> Self {
        Self {
            event_id,
            timestamp: chrono::Utc::now(),
            phase,
            percent: phase.percent(),
        }
    }
}

// ==========================================================================
// Session status
// ==========================================================================

/// Import state machine as reported to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ImportSessionStatus {
    Idle,
    #[serde(rename_all = "camelCase")]
    FileSelected {
        filename: String,
        size_bytes: usize,
    },
    #[serde(rename_all = "camelCase")]
    Parsing {
        filename: String,
    },
    #[serde(rename_all = "camelCase")]
    Parsed {
        summary: ImportSummary,
    },
    #[serde(rename_all = "camelCase")]
    Importing {
        guest_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    Imported {
        imported_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        code: String,
        error: String,
    },
}

// ==========================================================================
// Request / response payloads
// ==========================================================================

/// `wedding.guest.import.select`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectFileRequest {
    pub event_id: Uuid,
    pub filename: String,
    pub content_base64: String,
}

/// Payload of subjects that only address a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub event_id: Uuid,
}

/// Reply of `wedding.guest.import.process`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResultResponse {
    pub summary: ImportSummary,
    pub valid_guests: Vec<GuestRecord>,
    pub invalid_rows: Vec<InvalidRow>,
    pub report: String,
}

/// Reply of `wedding.guest.import.confirm`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub event_id: Uuid,
    pub imported_count: usize,
    pub guests: Vec<StoredGuest>,
}

/// Reply of `wedding.guest.import.template`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateResponse {
    pub filename: String,
    pub content_base64: String,
}

//! NATS message types

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// Generic request wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Caller identity, set by the gateway after authentication
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub payload: T,
}

impl<T> Request<T> {
    #[cfg(test)]
    pub fn for_user(user_id: Uuid, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user_id: Some(user_id),
            payload,
        }
    }
}

/// Generic success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(request_id: Uuid, payload: T) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(request_id: Uuid, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }
}

/// Empty payload that accepts both `null` and `{}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyPayload {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parses_without_user_id() {
        let json = r#"{
            "id": "00000000-0000-0000-0000-000000000000",
            "timestamp": "2025-06-01T10:00:00Z",
            "payload": {}
        }"#;
        let request: Request<EmptyPayload> = serde_json::from_str(json).unwrap();
        assert!(request.user_id.is_none());
    }

    #[test]
    fn test_request_parses_user_id_camel_case() {
        let user = Uuid::new_v4();
        let json = format!(
            r#"{{"id":"{}","timestamp":"2025-06-01T10:00:00Z","userId":"{}","payload":{{}}}}"#,
            Uuid::nil(),
            user
        );
        let request: Request<EmptyPayload> = serde_json::from_str(&json).unwrap();
        assert_eq!(request.user_id, Some(user));
    }

    #[test]
    fn test_error_response_skips_empty_details() {
        let error = ErrorResponse::new(Uuid::nil(), "PARSE_FAILURE", "bad file");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("PARSE_FAILURE"));
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_error_response_with_details() {
        let error = ErrorResponse::new(Uuid::nil(), "STORAGE_FAILURE", "down")
            .with_details(serde_json::json!({ "committed": [1, 2] }));
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("committed"));
    }
}

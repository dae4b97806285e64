use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Generic message for any 500 that does not reference a photo
pub const INTERNAL_ERROR: &str = "Internal server error";
/// Message of a successful upload
pub const UPLOAD_SUCCESSFUL: &str = "Upload successful";

/// Response envelope returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    /// JSON-encoded body
    pub body: String,
}

/// Body of a successful upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSuccess {
    pub message: String,
    pub photo_id: i64,
    pub timestamp: String,
    pub company_id: Option<i64>,
}

/// Body of a failed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiResponse {
    /// Build a response with the standard JSON and CORS headers
    pub fn json<T: Serialize>(status_code: u16, body: &T) -> Self {
        let headers = BTreeMap::from([
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
        ]);

        // Both body types serialize infallibly
        let body = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

        Self {
            status_code,
            headers,
            body,
        }
    }

    pub fn success(photo_id: i64, timestamp: String, company_id: Option<i64>) -> Self {
        Self::json(
            200,
            &UploadSuccess {
                message: UPLOAD_SUCCESSFUL.to_string(),
                photo_id,
                timestamp,
                company_id,
            },
        )
    }

    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        Self::json(
            status_code,
            &ErrorBody {
                error: message.into(),
            },
        )
    }

    pub fn internal_error() -> Self {
        Self::error(500, INTERNAL_ERROR)
    }
}

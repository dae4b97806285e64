//! Upload request decoding.
//!
//! The event `body` may arrive as a JSON object or as a JSON string holding
//! one. The image itself travels base64 encoded in `image_data_encoded`.

use crate::error::UploadError;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Client-facing message when the event carries no body
pub const MISSING_BODY: &str = "No file content found";
/// Client-facing message when the image payload is absent or not base64
pub const INVALID_CONTENT: &str = "Invalid file content";
/// Client-facing message when the body is not an upload object
pub const INVALID_BODY: &str = "Invalid request body";

/// Upload request body as sent by clients.
///
/// Values are passed through as-is; there is no range or presence checking
/// beyond the JSON types below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Processing models the client asked for
    pub models: Option<Vec<String>>,
    /// Target bucket for the image content
    pub bucket_name: Option<String>,
    pub user_id: Option<i64>,
    pub company_id: Option<i64>,
    /// Link recorded alongside the metadata row
    pub photo_s3_link: Option<String>,
    pub project_table_name: Option<String>,
    pub client_side_id: Option<String>,
    pub file_path: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub format: Option<String>,
    /// Size in bytes as reported by the client
    pub size: Option<i64>,
    pub source_resolution_x: Option<i64>,
    pub source_resolution_y: Option<i64>,
    /// Capture date in one of the accepted formats, see [`crate::date`]
    pub date_taken: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Base64-encoded image content
    #[serde(skip_serializing)]
    pub image_data_encoded: Option<String>,
}

/// A request whose image payload has been decoded
#[derive(Debug, Clone)]
pub struct DecodedUpload {
    pub request: UploadRequest,
    pub content: Vec<u8>,
}

/// Decode an inbound event into an upload.
///
/// The event must carry a `body` member, either as a JSON object or as a
/// JSON-encoded string. Every failure here is a [`UploadError::Validation`]
/// carrying the message returned to the client.
pub fn decode_event(event: &Value) -> Result<DecodedUpload, UploadError> {
    let body = match event.get("body") {
        None | Some(Value::Null) => return Err(UploadError::Validation(MISSING_BODY.to_string())),
        Some(body) => body,
    };

    let mut request = parse_body(body)?;

    let encoded = request
        .image_data_encoded
        .take()
        .ok_or_else(|| UploadError::Validation(INVALID_CONTENT.to_string()))?;

    let content = decode_image_data(&encoded)?;

    debug!(
        company_id = ?request.company_id,
        size_bytes = content.len(),
        "Decoded upload request"
    );

    Ok(DecodedUpload { request, content })
}

fn parse_body(body: &Value) -> Result<UploadRequest, UploadError> {
    let parsed = match body {
        Value::String(raw) => serde_json::from_str::<UploadRequest>(raw),
        Value::Object(_) => UploadRequest::deserialize(body),
        _ => return Err(UploadError::Validation(INVALID_BODY.to_string())),
    };

    parsed.map_err(|e| {
        debug!(error = %e, "Failed to parse request body");
        UploadError::Validation(INVALID_BODY.to_string())
    })
}

/// Decode base64 image data, ignoring line breaks and other ASCII whitespace
pub fn decode_image_data(encoded: &str) -> Result<Vec<u8>, UploadError> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    STANDARD.decode(compact).map_err(|e| {
        debug!(error = %e, "Failed to decode image data");
        UploadError::Validation(INVALID_CONTENT.to_string())
    })
}

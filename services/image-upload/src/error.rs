use thiserror::Error;

/// Errors that can occur while handling an upload
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unknown date format: {0}")]
    DateFormat(String),

    #[error("Failed to persist photo metadata: {0}")]
    Persistence(String),

    #[error("Failed to store object {key}: {message}")]
    Storage { key: String, message: String },

    #[error("Failed to publish events: {0}")]
    Publish(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl UploadError {
    /// HTTP status code the error maps to when it ends a request
    pub fn status_code(&self) -> u16 {
        match self {
            UploadError::Validation(_) => 400,
            UploadError::DateFormat(_)
            | UploadError::Persistence(_)
            | UploadError::Storage { .. }
            | UploadError::Publish(_)
            | UploadError::Unexpected(_) => 500,
        }
    }
}

use crate::services::blob_store::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Every way an upload can be turned down or fail.
///
/// The `Display` text is the message reported after the `ERR: ` prefix.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Missing body")]
    MissingBody,

    #[error("Malformed base64 body")]
    MalformedBody(#[source] base64::DecodeError),

    #[error("File too large")]
    TooLarge { size: usize, limit: usize },

    #[error("Missing `username`")]
    MissingUsername,

    #[error("Invalid username")]
    InvalidUsername(String),

    #[error("Content type {0} is not allowed")]
    ContentTypeNotAllowed(String),

    #[error("Application error: no free key for `{filename}` after {attempts} attempts")]
    KeyAllocationExhausted { filename: String, attempts: usize },

    #[error("Application error: {0}")]
    Storage(#[from] StorageError),
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingBody
            | Self::MalformedBody(_)
            | Self::MissingUsername
            | Self::ContentTypeNotAllowed(_) => StatusCode::BAD_REQUEST,
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidUsername(_) => StatusCode::FORBIDDEN,
            Self::KeyAllocationExhausted { .. } | Self::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ObjectNotFound { .. } => AppError::not_found(err.to_string()),
            StorageError::InvalidObjectKey | StorageError::InvalidBucketName { .. } => {
                AppError::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            other => AppError::internal(other.to_string()),
        }
    }
}

//! Per-request values flowing through the upload pipeline.
//!
//! Nothing here outlives a single invocation: a request is parsed into an
//! [`InboundRequest`], validated into an [`AcceptedUpload`] and answered with an
//! [`UploadResponse`].

use crate::errors::UploadError;
use axum::http::HeaderMap;
use bytes::Bytes;

/// A request as handed over by the dispatcher, before any validation.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// Case-insensitive request headers.
    pub headers: HeaderMap,
    /// Raw body. `None` when the dispatcher delivered no body at all.
    pub body: Option<Bytes>,
    /// Whether `body` holds base64 text rather than the file bytes.
    pub is_base64_encoded: bool,
}

/// A validated file, ready to be placed in the blob store.
///
/// `content` is never empty: requests without a body are rejected before this
/// value is built.
#[derive(Debug, Clone)]
pub struct InboundFile {
    pub filename: String,
    pub content_type: String,
    pub content: Bytes,
}

/// Outcome of a successful validation.
#[derive(Debug, Clone)]
pub struct AcceptedUpload {
    pub file: InboundFile,
    pub username: String,
}

/// Validation outcome: either an accepted upload or the rejection to report.
pub type UploadDecision = Result<AcceptedUpload, UploadError>;

/// Response produced by the pipeline, forwarded verbatim by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub status_code: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl UploadResponse {
    /// `201 Created` pointing at the stored object.
    pub fn created(url: &str) -> Self {
        Self {
            status_code: 201,
            body: format!("SUCCESS: {url}"),
            headers: vec![("location".to_string(), url.to_string())],
        }
    }
}

#[cfg(test)]
impl UploadResponse {
    /// Look up a response header by (lowercase) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl From<UploadError> for UploadResponse {
    fn from(err: UploadError) -> Self {
        Self {
            status_code: err.status().as_u16(),
            body: format!("ERR: {err}"),
            headers: Vec::new(),
        }
    }
}

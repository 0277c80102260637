//! Request validation: turns an [`InboundRequest`] into an [`UploadDecision`].
//!
//! Gates run in a fixed order and the first failure wins:
//! body presence, size, content-type resolution, filename resolution,
//! identity, content-type policy. No storage I/O happens here.

use crate::errors::UploadError;
use crate::models::upload::{AcceptedUpload, InboundFile, InboundRequest, UploadDecision};
use crate::services::{
    content_types::{self, FALLBACK_CONTENT_TYPE, FALLBACK_EXTENSION},
    sniffer::ContentSniffer,
};
use axum::http::{HeaderMap, header};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::Utc;
use std::{collections::HashSet, sync::Arc};

/// Largest accepted decoded payload: 50 MiB.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub const USERNAME_HEADER: &str = "soju-username";

#[derive(Clone)]
pub struct RequestValidator {
    allowed_usernames: Arc<HashSet<String>>,
    sniffer: Arc<dyn ContentSniffer>,
    max_bytes: usize,
}

impl RequestValidator {
    pub fn new(allowed_usernames: HashSet<String>, sniffer: Arc<dyn ContentSniffer>) -> Self {
        Self {
            allowed_usernames: Arc::new(allowed_usernames),
            sniffer,
            max_bytes: MAX_UPLOAD_BYTES,
        }
    }

    pub fn validate(&self, request: &InboundRequest) -> UploadDecision {
        let body = request
            .body
            .as_ref()
            .filter(|body| !body.is_empty())
            .ok_or(UploadError::MissingBody)?;

        let content = decode_body(body, request.is_base64_encoded)?;
        if content.len() > self.max_bytes {
            return Err(UploadError::TooLarge {
                size: content.len(),
                limit: self.max_bytes,
            });
        }
        // Base64 of whitespace decodes to nothing.
        if content.is_empty() {
            return Err(UploadError::MissingBody);
        }

        let (content_type, extension) = self.resolve_content_type(&request.headers, &content);
        let filename = filename_from_disposition(&request.headers)
            .unwrap_or_else(|| format!("upload-{}.{}", Utc::now().timestamp_millis(), extension));

        let username = self.check_identity(&request.headers)?;

        if !content_types::is_allowed(&content_type) {
            return Err(UploadError::ContentTypeNotAllowed(content_type));
        }

        Ok(AcceptedUpload {
            file: InboundFile {
                filename,
                content_type,
                content,
            },
            username,
        })
    }

    /// Declared type unless it is missing or a placeholder, in which case the
    /// bytes are sniffed. Returns `(mime, extension)`.
    fn resolve_content_type(&self, headers: &HeaderMap, content: &[u8]) -> (String, String) {
        let declared = header_str(headers, header::CONTENT_TYPE.as_str())
            .map(content_types::essence)
            .unwrap_or_default();

        if !content_types::is_placeholder(&declared) {
            let extension = content_types::extension_for(&declared).unwrap_or(FALLBACK_EXTENSION);
            return (declared, extension.to_string());
        }

        match self.sniffer.detect(content) {
            Some(sniffed) => (sniffed.mime, sniffed.extension),
            None => (
                FALLBACK_CONTENT_TYPE.to_string(),
                FALLBACK_EXTENSION.to_string(),
            ),
        }
    }

    fn check_identity(&self, headers: &HeaderMap) -> Result<String, UploadError> {
        let username = header_str(headers, USERNAME_HEADER)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(UploadError::MissingUsername)?;

        if !self.allowed_usernames.contains(username) {
            return Err(UploadError::InvalidUsername(username.to_string()));
        }
        Ok(username.to_string())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Base64 bodies are decoded, anything else is taken as the file bytes.
fn decode_body(body: &Bytes, is_base64: bool) -> Result<Bytes, UploadError> {
    if !is_base64 {
        return Ok(body.clone());
    }
    let compact: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    general_purpose::STANDARD
        .decode(compact)
        .map(Bytes::from)
        .map_err(UploadError::MalformedBody)
}

/// Extract the quoted `filename="..."` value from `content-disposition`,
/// reduced to a name that is safe to embed in a storage key.
fn filename_from_disposition(headers: &HeaderMap) -> Option<String> {
    let disposition = header_str(headers, header::CONTENT_DISPOSITION.as_str())?;
    const TOKEN: &str = "filename=\"";
    let start = disposition.find(TOKEN)? + TOKEN.len();
    let end = disposition[start..].find('"')? + start;
    let name = sanitize_filename(&disposition[start..end]);
    (!name.is_empty()).then_some(name)
}

/// Longest sanitized filename, in bytes. Leaves room for the allocator's
/// `-xxxxxxxx` suffix within the 255-byte file name limit of common filesystems.
const MAX_FILENAME_BYTES: usize = 200;

/// Keep only the last path component and characters that are safe in a key.
///
/// Runs of `.` collapse to one, so the result never contains `..`. Names over
/// [`MAX_FILENAME_BYTES`] lose the end of their stem; the extension is kept.
fn sanitize_filename(filename: &str) -> String {
    let last = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let mut cleaned = String::with_capacity(last.len());
    for c in last
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        if c == '.' && cleaned.ends_with('.') {
            continue;
        }
        cleaned.push(c);
    }
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.len() <= MAX_FILENAME_BYTES {
        return cleaned.to_string();
    }

    match cleaned.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && !ext.is_empty() && ext.len() < MAX_FILENAME_BYTES / 2 =>
        {
            let stem = truncate_on_char_boundary(stem, MAX_FILENAME_BYTES - ext.len() - 1)
                .trim_end_matches('.');
            format!("{stem}.{ext}")
        }
        _ => truncate_on_char_boundary(cleaned, MAX_FILENAME_BYTES).to_string(),
    }
}

fn truncate_on_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

//! JSON envelope exchanged with an external request dispatcher.
//!
//! The dispatcher delivers `{ headers, body, isBase64Encoded }` and forwards the
//! returned `{ statusCode, body, headers }` to the caller untouched.

use crate::models::upload::{InboundRequest, UploadResponse};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchEvent {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub status_code: u16,
    pub body: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl From<DispatchEvent> for InboundRequest {
    fn from(event: DispatchEvent) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in event.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::debug!("dropping unusable dispatcher header `{}`", name),
            }
        }

        Self {
            headers,
            body: event.body.map(Bytes::from),
            is_base64_encoded: event.is_base64_encoded,
        }
    }
}

impl From<UploadResponse> for DispatchResponse {
    fn from(resp: UploadResponse) -> Self {
        Self {
            status_code: resp.status_code,
            body: resp.body,
            headers: resp.headers.into_iter().collect(),
        }
    }
}

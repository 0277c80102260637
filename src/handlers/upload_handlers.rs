//! HTTP entry points into the upload pipeline.
//!
//! `POST /` takes the file as the request body. `POST /events` takes the JSON
//! envelope an external dispatcher would send and answers with its JSON
//! counterpart.

use crate::{
    models::{
        dispatch::{DispatchEvent, DispatchResponse},
        upload::{InboundRequest, UploadResponse},
    },
    state::AppState,
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};

/// `content-transfer-encoding: base64` marks a base64 request body.
fn is_base64_transfer(headers: &HeaderMap) -> bool {
    headers
        .get("content-transfer-encoding")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("base64"))
}

/// `POST /`: raw upload.
pub async fn upload_raw(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let is_base64_encoded = is_base64_transfer(&headers);
    let request = InboundRequest {
        headers,
        body: (!body.is_empty()).then_some(body),
        is_base64_encoded,
    };

    let upload = state.uploads.handle(request).await;
    into_http_response(upload)
}

/// `POST /events`: dispatcher envelope in, dispatcher envelope out.
pub async fn upload_event(
    State(state): State<AppState>,
    Json(event): Json<DispatchEvent>,
) -> Json<DispatchResponse> {
    let upload = state.uploads.handle(event.into()).await;
    Json(upload.into())
}

fn into_http_response(upload: UploadResponse) -> Response {
    let status =
        StatusCode::from_u16(upload.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = Response::new(Body::from(upload.body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    for (name, value) in upload.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.insert(name, value);
        }
    }
    response
}

//! HTTP handlers serving stored objects under their native URL.
//! Streams object bodies to avoid buffering in memory. Only `public-read`
//! objects are served.

use crate::{
    errors::AppError,
    models::object::{ObjectAcl, ObjectMeta},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};

/// Download an object `/{bucket}/{*key}` as a streaming response.
pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (meta, stream) = state.store.get(&bucket, &key).await?;
    ensure_public(&meta)?;

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);

    Ok(response)
}

/// HEAD `/{bucket}/{*key}`: same headers as GET but no body.
pub async fn head_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (meta, _stream) = state.store.get(&bucket, &key).await?;
    ensure_public(&meta)?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);

    Ok(response)
}

fn ensure_public(meta: &ObjectMeta) -> Result<(), AppError> {
    match meta.acl {
        ObjectAcl::PublicRead => Ok(()),
        ObjectAcl::Private => Err(AppError::new(
            StatusCode::FORBIDDEN,
            format!("object `{}` is not public", meta.key),
        )),
    }
}

fn set_object_headers(headers: &mut HeaderMap, meta: &ObjectMeta) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&meta.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", meta.etag)) {
        headers.insert(header::ETAG, value);
    }

    if let Ok(value) = HeaderValue::from_str(&meta.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

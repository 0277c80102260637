//! Defines the routes of the upload gateway.
//!
//! ## Structure
//! - **Upload endpoints**
//!   - `POST /`: upload the request body as a file
//!   - `POST /events`: upload from a dispatcher JSON envelope
//!
//! - **Object endpoints**
//!   - `GET  /{bucket}/{*key}`: download a public object
//!   - `HEAD /{bucket}/{*key}`: retrieve headers only
//!
//! - **Health endpoints**: `GET /healthz`, `GET /readyz`

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{get_object, head_object},
        upload_handlers::{upload_event, upload_raw},
    },
    services::validator::MAX_UPLOAD_BYTES,
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Transport-level cap. Above the pipeline's own limit so oversized uploads
/// get the pipeline's 413 response, with room for base64 inflation.
pub const TRANSPORT_BODY_LIMIT: usize = MAX_UPLOAD_BYTES / 5 * 8;

/// Build and return the router; the `AppState` is shared by all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // upload endpoints
        .route("/", post(upload_raw))
        .route("/events", post(upload_event))
        // object routes
        .route("/{bucket}/{*key}", get(get_object).head(head_object))
        .layer(DefaultBodyLimit::max(TRANSPORT_BODY_LIMIT))
}

use crate::services::{blob_store::BlobStore, upload_service::UploadService};
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub uploads: UploadService,
    pub store: Arc<dyn BlobStore>,
}

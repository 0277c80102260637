//! UploadService: runs one upload from request to response.
//!
//! validate → allocate key → write → respond. The write is the last step, so a
//! rejected or failed request never leaves a partial object behind.

use crate::config::UploadConfig;
use crate::errors::UploadError;
use crate::models::{
    object::ObjectAcl,
    upload::{AcceptedUpload, InboundRequest, UploadResponse},
};
use crate::services::{
    blob_store::{BlobStore, encode_key},
    key_allocator::KeyAllocator,
    sniffer::ContentSniffer,
    validator::RequestValidator,
};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct UploadService {
    validator: RequestValidator,
    allocator: KeyAllocator,
    store: Arc<dyn BlobStore>,
    bucket: String,
    cdn_domain: Option<String>,
}

impl UploadService {
    pub fn new(
        config: UploadConfig,
        store: Arc<dyn BlobStore>,
        sniffer: Arc<dyn ContentSniffer>,
    ) -> Self {
        Self {
            validator: RequestValidator::new(config.allowed_usernames, sniffer),
            allocator: KeyAllocator::new(store.clone()),
            store,
            bucket: config.bucket,
            cdn_domain: config.cdn_domain,
        }
    }

    /// Handle one request. Every outcome, including storage failures, becomes a response.
    pub async fn handle(&self, request: InboundRequest) -> UploadResponse {
        match self.process(request).await {
            Ok(url) => UploadResponse::created(&url),
            Err(err) => {
                let status = err.status();
                if status.is_server_error() {
                    error!(status = status.as_u16(), error = %err, "upload failed");
                } else {
                    warn!(status = status.as_u16(), reason = %err, "upload rejected");
                }
                err.into()
            }
        }
    }

    async fn process(&self, request: InboundRequest) -> Result<String, UploadError> {
        let AcceptedUpload { file, username } = self.validator.validate(&request)?;
        let key = self.allocator.allocate(&self.bucket, &file.filename).await?;
        let size = file.content.len();

        self.store
            .put(
                &self.bucket,
                &key,
                file.content,
                &file.content_type,
                ObjectAcl::PublicRead,
            )
            .await?;

        info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            content_type = %file.content_type,
            username = %username,
            "upload stored"
        );

        Ok(self.public_url(&key))
    }

    fn public_url(&self, key: &str) -> String {
        match &self.cdn_domain {
            Some(domain) => format!(
                "https://{}/{}",
                domain.trim_end_matches('/'),
                encode_key(key)
            ),
            None => self.store.native_url(&self.bucket, key),
        }
    }
}

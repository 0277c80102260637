//! Blob store abstraction consumed by the upload pipeline.
//!
//! The pipeline only needs an existence probe and a write. Reads, native URLs
//! and readiness checks back the object-serving and health routes.

use crate::models::object::{ObjectAcl, ObjectMeta};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::{io, pin::Pin};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Payload stream returned by [`BlobStore::get`].
pub type BlobStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Outcome of one readiness probe run by a store.
#[derive(Debug, Clone)]
pub struct ReadinessCheck {
    pub name: &'static str,
    pub ok: bool,
    pub error: Option<String>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Whether an object already occupies `key`. A missing object is `Ok(false)`.
    async fn head_exists(&self, bucket: &str, key: &str) -> StorageResult<bool>;

    /// Write `data` under `key`, replacing whatever was there.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
        acl: ObjectAcl,
    ) -> StorageResult<()>;

    /// Fetch metadata and a payload stream for `key`.
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<(ObjectMeta, BlobStream)>;

    /// URL under which the store itself exposes `key`.
    fn native_url(&self, bucket: &str, key: &str) -> String;

    async fn readiness(&self) -> Vec<ReadinessCheck> {
        Vec::new()
    }
}

/// Percent-encode each `/`-separated segment of a key for use in a URL path.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Join an endpoint, bucket and key into a URL.
pub fn object_url(endpoint: &str, bucket: &str, key: &str) -> String {
    format!(
        "{}/{}/{}",
        endpoint.trim_end_matches('/'),
        bucket,
        encode_key(key)
    )
}

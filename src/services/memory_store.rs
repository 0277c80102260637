//! In-process blob store for local development and tests.

use crate::models::object::{ObjectAcl, ObjectMeta};
use crate::services::blob_store::{
    BlobStore, BlobStream, StorageError, StorageResult, object_url,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredBlob {
    meta: ObjectMeta,
    data: Bytes,
}

/// Keeps every object in a map keyed by `(bucket, key)`. Contents are lost on exit.
pub struct MemoryBlobStore {
    public_endpoint: String,
    objects: RwLock<HashMap<(String, String), StoredBlob>>,
}

impl MemoryBlobStore {
    pub fn new(public_endpoint: impl Into<String>) -> Self {
        Self {
            public_endpoint: public_endpoint.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
impl MemoryBlobStore {
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn head_exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        Ok(self
            .objects
            .read()
            .await
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
        acl: ObjectAcl,
    ) -> StorageResult<()> {
        let meta = ObjectMeta {
            id: Uuid::new_v4(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            size_bytes: data.len() as i64,
            etag: format!("{:x}", md5::compute(&data)),
            acl,
            last_modified: Utc::now(),
        };
        self.objects
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), StoredBlob { meta, data });
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<(ObjectMeta, BlobStream)> {
        let objects = self.objects.read().await;
        let blob = objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
        let stream = futures::stream::once(async move { Ok(blob.data) }).boxed();
        Ok((blob.meta, stream))
    }

    fn native_url(&self, bucket: &str, key: &str) -> String {
        object_url(&self.public_endpoint, bucket, key)
    }
}

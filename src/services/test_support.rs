//! Blob stores shared by pipeline tests: fakes plus a throwaway disk store.

use crate::models::object::{ObjectAcl, ObjectMeta};
use crate::services::blob_store::{BlobStore, BlobStream, StorageError, StorageResult};
use crate::services::disk_store::DiskStore;
use async_trait::async_trait;
use bytes::Bytes;
use sqlx::sqlite::SqlitePoolOptions;
use std::io;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tempfile::TempDir;

/// A migrated [`DiskStore`] over an in-memory SQLite database and a temp directory.
/// Keep the returned `TempDir` alive for as long as the store is used.
pub async fn temp_disk_store() -> (DiskStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = DiskStore::new(Arc::new(pool), dir.path(), "http://localhost:3000");
    store.migrate().await.unwrap();
    (store, dir)
}

/// Reports every key as occupied and counts probes and writes.
#[derive(Default)]
pub struct FullStore {
    pub probes: AtomicUsize,
    pub puts: AtomicUsize,
}

#[async_trait]
impl BlobStore for FullStore {
    async fn head_exists(&self, _bucket: &str, _key: &str) -> StorageResult<bool> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn put(
        &self,
        _bucket: &str,
        _key: &str,
        _data: Bytes,
        _content_type: &str,
        _acl: ObjectAcl,
    ) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<(ObjectMeta, BlobStream)> {
        Err(StorageError::ObjectNotFound {
            bucket: bucket.into(),
            key: key.into(),
        })
    }

    fn native_url(&self, bucket: &str, key: &str) -> String {
        format!("https://full.example/{bucket}/{key}")
    }
}

/// Every key is free but every write fails with an I/O error.
pub struct BrokenStore;

#[async_trait]
impl BlobStore for BrokenStore {
    async fn head_exists(&self, _bucket: &str, _key: &str) -> StorageResult<bool> {
        Ok(false)
    }

    async fn put(
        &self,
        _bucket: &str,
        _key: &str,
        _data: Bytes,
        _content_type: &str,
        _acl: ObjectAcl,
    ) -> StorageResult<()> {
        Err(StorageError::Io(io::Error::other("disk on fire")))
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<(ObjectMeta, BlobStream)> {
        Err(StorageError::ObjectNotFound {
            bucket: bucket.into(),
            key: key.into(),
        })
    }

    fn native_url(&self, bucket: &str, key: &str) -> String {
        format!("https://broken.example/{bucket}/{key}")
    }
}

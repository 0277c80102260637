//! src/services/disk_store.rs
//!
//! DiskStore: blob store backed by SQLite for object metadata and local disk
//! for payloads sharded beneath `base_path/{bucket}/{shard}/{shard}/{key}`.

use crate::models::object::{ObjectAcl, ObjectMeta};
use crate::services::blob_store::{
    BlobStore, BlobStream, ReadinessCheck, StorageError, StorageResult, object_url,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

/// Schema for the `objects` table. Idempotent, safe to apply on every start.
pub const SCHEMA_SQL: &str = include_str!("../../migrations/0001_init.sql");

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// DiskStore keeps a minimal surface area: probe, write, read.
///
/// Writes land in a temp file first and are renamed into place, so a reader
/// never observes a half-written payload.
#[derive(Clone)]
pub struct DiskStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    /// Externally reachable base URL of this service, used for native URLs.
    pub public_endpoint: String,
}

impl DiskStore {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        public_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            public_endpoint: public_endpoint.into(),
        }
    }

    /// Apply [`SCHEMA_SQL`] statement by statement.
    pub async fn migrate(&self) -> StorageResult<()> {
        let statements = SCHEMA_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(StorageError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StorageError::InvalidObjectKey);
        }
        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(bucket_name);
        path
    }

    /// Two-level shard identifiers: the first two bytes of MD5(bucket/key) as hex.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// `base_path/bucket/{shard}/{shard}/{key}`. Parent directories may not exist yet.
    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_object(&self, bucket: &str, key: &str) -> StorageResult<Option<ObjectMeta>> {
        let row = sqlx::query_as::<_, ObjectMeta>(
            "SELECT id, bucket, key, content_type, size_bytes, etag, acl, last_modified
             FROM objects
             WHERE bucket = ? AND key = ?",
        )
        .bind(bucket)
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    /// Write the payload to a temp file, fsync and rename it over `file_path`.
    /// Returns the hex MD5 of what was written.
    async fn write_payload(&self, file_path: &Path, data: &[u8]) -> StorageResult<String> {
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::other("object path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut digest = Context::new();
        digest.consume(data);
        if let Err(err) = file.write_all(data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(file_path).await?;
                fs::rename(&tmp_path, file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        Ok(format!("{:x}", digest.compute()))
    }
}

#[async_trait]
impl BlobStore for DiskStore {
    async fn head_exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        validate_bucket_name(bucket)?;
        self.ensure_key_safe(key)?;
        Ok(self.fetch_object(bucket, key).await?.is_some())
    }

    /// Upserts the metadata row after the payload is in place (S3-like overwrite
    /// semantics). If the row cannot be written, a payload that had no row before
    /// is removed again; an overwritten payload stays with its existing row.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
        acl: ObjectAcl,
    ) -> StorageResult<()> {
        validate_bucket_name(bucket)?;
        self.ensure_key_safe(key)?;

        let existed = self.fetch_object(bucket, key).await?.is_some();
        let file_path = self.object_path(bucket, key);
        let etag = self.write_payload(&file_path, &data).await?;

        let insert_result = sqlx::query(
            r#"
            INSERT INTO objects (
                id, bucket, key, content_type, size_bytes, etag, acl, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                acl = excluded.acl,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bucket)
        .bind(key)
        .bind(content_type)
        .bind(data.len() as i64)
        .bind(&etag)
        .bind(acl)
        .bind(Utc::now())
        .execute(&*self.db)
        .await;

        match insert_result {
            Ok(_) => {
                debug!("stored {} bytes at {}", data.len(), file_path.display());
                Ok(())
            }
            Err(err) => {
                if !existed {
                    let _ = fs::remove_file(&file_path).await;
                }
                Err(StorageError::Sqlx(err))
            }
        }
    }

    /// Returns ObjectNotFound if metadata exists but the physical file is missing.
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<(ObjectMeta, BlobStream)> {
        validate_bucket_name(bucket)?;
        self.ensure_key_safe(key)?;
        let not_found = || StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };

        let meta = self.fetch_object(bucket, key).await?.ok_or_else(not_found)?;
        let file = File::open(self.object_path(bucket, key))
            .await
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    not_found()
                } else {
                    StorageError::Io(err)
                }
            })?;

        Ok((meta, ReaderStream::new(file).boxed()))
    }

    fn native_url(&self, bucket: &str, key: &str) -> String {
        object_url(&self.public_endpoint, bucket, key)
    }

    /// 1. `SELECT 1` against SQLite.
    /// 2. Best-effort write/read/delete of a probe file under `base_path`.
    async fn readiness(&self) -> Vec<ReadinessCheck> {
        let sqlite = match sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await
        {
            Ok(1) => (true, None),
            Ok(v) => (false, Some(format!("unexpected result: {}", v))),
            Err(e) => (false, Some(format!("error: {}", e))),
        };

        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        let disk = match fs::write(&tmp_path, b"readyz").await {
            Ok(_) => match fs::read(&tmp_path).await {
                Ok(bytes) if bytes == b"readyz" => match fs::remove_file(&tmp_path).await {
                    Ok(_) => (true, None),
                    Err(e) => (true, Some(format!("could not remove tmp file: {}", e))),
                },
                Ok(_) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    (false, Some("file content mismatch".to_string()))
                }
                Err(e) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    (false, Some(format!("could not read tmp file: {}", e)))
                }
            },
            Err(e) => (false, Some(format!("could not write tmp file: {}", e))),
        };

        vec![
            ReadinessCheck {
                name: "sqlite",
                ok: sqlite.0,
                error: sqlite.1,
            },
            ReadinessCheck {
                name: "disk",
                ok: disk.0,
                error: disk.1,
            },
        ]
    }
}

/// Validate bucket name format.
///
/// Enforces S3-like naming rules:
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - cannot start/end with dot or hyphen
/// - cannot contain consecutive dots or dot-hyphen patterns
/// - cannot look like an IPv4 address
pub fn validate_bucket_name(name: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(invalid("must be between 3 and 63 characters"));
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }

    if name.starts_with('.') || name.ends_with('.') || name.starts_with('-') || name.ends_with('-')
    {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }

    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return Err(invalid(
            "cannot contain consecutive dots or dot-hyphen combinations",
        ));
    }

    if is_ipv4_like(name) {
        return Err(invalid("must not be formatted like an IP address"));
    }

    Ok(())
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::temp_disk_store as store;

    async fn collect(mut stream: BlobStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn put_then_head_and_get() {
        let (store, _dir) = store().await;
        assert!(!store.head_exists("uploads", "cat-0a1b2c3d.png").await.unwrap());

        store
            .put(
                "uploads",
                "cat-0a1b2c3d.png",
                Bytes::from_static(b"meow"),
                "image/png",
                ObjectAcl::PublicRead,
            )
            .await
            .unwrap();

        assert!(store.head_exists("uploads", "cat-0a1b2c3d.png").await.unwrap());
        let (meta, stream) = store.get("uploads", "cat-0a1b2c3d.png").await.unwrap();
        assert_eq!(meta.content_type, "image/png");
        assert_eq!(meta.size_bytes, 4);
        assert_eq!(meta.acl, ObjectAcl::PublicRead);
        assert_eq!(meta.etag, format!("{:x}", md5::compute(b"meow")));
        assert_eq!(collect(stream).await, b"meow");
    }

    #[tokio::test]
    async fn put_overwrites_existing_object() {
        let (store, _dir) = store().await;
        for body in [&b"first"[..], &b"second"[..]] {
            store
                .put(
                    "uploads",
                    "note.txt",
                    Bytes::copy_from_slice(body),
                    "text/plain",
                    ObjectAcl::Private,
                )
                .await
                .unwrap();
        }
        let (meta, stream) = store.get("uploads", "note.txt").await.unwrap();
        assert_eq!(meta.size_bytes, 6);
        assert_eq!(collect(stream).await, b"second");
    }

    #[tokio::test]
    async fn get_missing_object_is_not_found() {
        let (store, _dir) = store().await;
        let err = store.get("uploads", "nope.bin").await.err().unwrap();
        assert!(matches!(err, StorageError::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn unsafe_keys_are_rejected() {
        let (store, _dir) = store().await;
        for key in ["", "/etc/passwd", "../escape", "a\\b", "tab\there"] {
            let err = store.head_exists("uploads", key).await.err().unwrap();
            assert!(matches!(err, StorageError::InvalidObjectKey), "key {key:?}");
        }
    }

    #[tokio::test]
    async fn readiness_reports_both_checks() {
        let (store, _dir) = store().await;
        let checks = store.readiness().await;
        assert_eq!(checks.len(), 2);
        assert!(checks.iter().all(|c| c.ok), "{checks:?}");
    }

    #[tokio::test]
    async fn native_url_uses_public_endpoint() {
        let (mut store, _dir) = store().await;
        store.public_endpoint = "https://files.example.com/".into();
        assert_eq!(
            store.native_url("uploads", "a-0a1b2c3d.pdf"),
            "https://files.example.com/uploads/a-0a1b2c3d.pdf"
        );
    }

    #[test]
    fn bucket_names_follow_s3_rules() {
        assert!(validate_bucket_name("uploads").is_ok());
        assert!(validate_bucket_name("my.bucket-1").is_ok());
        for bad in ["ab", "Uploads", "-uploads", "up..loads", "up.-loads", "192.168.0.1"] {
            assert!(validate_bucket_name(bad).is_err(), "{bad}");
        }
    }

    #[tokio::test]
    async fn failed_overwrite_keeps_the_previous_payload() {
        let (store, _dir) = store().await;
        store
            .put(
                "uploads",
                "note.txt",
                Bytes::from_static(b"first"),
                "text/plain",
                ObjectAcl::PublicRead,
            )
            .await
            .unwrap();

        sqlx::query(
            "CREATE TRIGGER freeze_objects BEFORE UPDATE ON objects
             BEGIN SELECT RAISE(ABORT, 'frozen'); END",
        )
        .execute(&*store.db)
        .await
        .unwrap();

        let err = store
            .put(
                "uploads",
                "note.txt",
                Bytes::from_static(b"second"),
                "text/plain",
                ObjectAcl::PublicRead,
            )
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StorageError::Sqlx(_)));

        let (meta, stream) = store.get("uploads", "note.txt").await.unwrap();
        assert_eq!(meta.size_bytes, 5);
        assert!(!collect(stream).await.is_empty());
    }

    #[tokio::test]
    async fn failed_first_write_leaves_no_payload() {
        let (store, _dir) = store().await;
        sqlx::query(
            "CREATE TRIGGER refuse_objects BEFORE INSERT ON objects
             BEGIN SELECT RAISE(ABORT, 'refused'); END",
        )
        .execute(&*store.db)
        .await
        .unwrap();

        let err = store
            .put(
                "uploads",
                "note.txt",
                Bytes::from_static(b"first"),
                "text/plain",
                ObjectAcl::PublicRead,
            )
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StorageError::Sqlx(_)));
        assert!(!store.object_path("uploads", "note.txt").exists());
    }
}

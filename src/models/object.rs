//! Represents an object (file) stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Canned access policy attached to a stored object.
#[derive(Serialize, Deserialize, sqlx::Type, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum ObjectAcl {
    /// Anyone holding the URL may read the object.
    PublicRead,
    /// Only the service itself may read the object.
    Private,
}

/// Metadata of a single object (blob) within a bucket.
///
/// The struct describes the stored payload, it never holds the content bytes.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ObjectMeta {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Name of the bucket holding the object.
    pub bucket: String,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Content type (MIME type) declared at write time.
    pub content_type: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Hex MD5 of the payload.
    pub etag: String,

    pub acl: ObjectAcl,

    /// Timestamp when object was last written.
    pub last_modified: DateTime<Utc>,
}

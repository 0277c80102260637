//! Collision-avoiding storage key allocation.
//!
//! A random 8-hex-character suffix is appended to the filename stem and the
//! bucket is probed for the candidate. The probe and the later write are not
//! atomic: two concurrent uploads can both see the same key as free.

use crate::errors::UploadError;
use crate::services::blob_store::BlobStore;
use rand::{RngCore, rngs::OsRng};
use std::sync::Arc;
use tracing::debug;

pub const MAX_KEY_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct KeyAllocator {
    store: Arc<dyn BlobStore>,
    max_attempts: usize,
}

impl KeyAllocator {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            max_attempts: MAX_KEY_ATTEMPTS,
        }
    }

    /// Find a key derived from `filename` that is not yet taken in `bucket`.
    pub async fn allocate(&self, bucket: &str, filename: &str) -> Result<String, UploadError> {
        for attempt in 1..=self.max_attempts {
            let candidate = candidate_key(filename, &random_suffix());
            if !self.store.head_exists(bucket, &candidate).await? {
                return Ok(candidate);
            }
            debug!(attempt, %candidate, "storage key already taken, retrying");
        }

        Err(UploadError::KeyAllocationExhausted {
            filename: filename.to_string(),
            attempts: self.max_attempts,
        })
    }
}

/// 4 bytes from the OS CSPRNG, hex-encoded.
fn random_suffix() -> String {
    let mut buf = [0u8; 4];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// `<stem>-<suffix>.<ext>`, or `<stem>-<suffix>` when the filename has no
/// usable extension (no dot, or nothing on one side of the last dot).
fn candidate_key(filename: &str, suffix: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{stem}-{suffix}.{ext}")
        }
        _ => format!("{filename}-{suffix}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_store::MemoryBlobStore;
    use crate::services::test_support::FullStore;
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;

    fn assert_suffixed(key: &str, stem: &str, ext: Option<&str>) {
        let rest = key
            .strip_prefix(stem)
            .and_then(|r| r.strip_prefix('-'))
            .unwrap_or_else(|| panic!("{key} does not start with {stem}-"));
        let (suffix, tail) = rest.split_at(8);
        assert!(
            suffix.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')),
            "suffix {suffix} is not lowercase hex"
        );
        match ext {
            Some(ext) => assert_eq!(tail, format!(".{ext}")),
            None => assert_eq!(tail, ""),
        }
    }

    #[test]
    fn candidate_keeps_extension() {
        assert_eq!(candidate_key("cat.png", "0a1b2c3d"), "cat-0a1b2c3d.png");
        assert_eq!(
            candidate_key("archive.tar.gz", "0a1b2c3d"),
            "archive.tar-0a1b2c3d.gz"
        );
    }

    #[test]
    fn candidate_without_extension_has_no_trailing_dot() {
        assert_eq!(candidate_key("README", "0a1b2c3d"), "README-0a1b2c3d");
        assert_eq!(candidate_key("trailing.", "0a1b2c3d"), "trailing.-0a1b2c3d");
        assert_eq!(candidate_key(".env", "0a1b2c3d"), ".env-0a1b2c3d");
    }

    #[test]
    fn suffix_is_eight_hex_chars() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn allocates_suffixed_keys() {
        let allocator = KeyAllocator::new(Arc::new(MemoryBlobStore::new("https://x.test")));
        assert_suffixed(
            &allocator.allocate("uploads", "photo.jpeg").await.unwrap(),
            "photo",
            Some("jpeg"),
        );
        assert_suffixed(
            &allocator.allocate("uploads", "Makefile").await.unwrap(),
            "Makefile",
            None,
        );
    }

    #[tokio::test]
    async fn repeated_allocations_differ() {
        let allocator = KeyAllocator::new(Arc::new(MemoryBlobStore::new("https://x.test")));
        let mut keys = HashSet::new();
        for _ in 0..16 {
            keys.insert(allocator.allocate("uploads", "photo.png").await.unwrap());
        }
        assert_eq!(keys.len(), 16);
    }

    #[tokio::test]
    async fn gives_up_after_three_occupied_probes() {
        let store = Arc::new(FullStore::default());
        let allocator = KeyAllocator::new(store.clone());

        let err = allocator.allocate("uploads", "photo.png").await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::KeyAllocationExhausted { attempts: 3, .. }
        ));
        assert_eq!(store.probes.load(Ordering::SeqCst), MAX_KEY_ATTEMPTS);
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    }
}

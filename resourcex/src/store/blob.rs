//! RXAStore: the content-addressed blob store (`§4.4`).
//!
//! Blobs are immutable and keyed by digest alone; `put` is idempotent on an
//! equal digest and rejects a caller-asserted digest that doesn't match the
//! bytes actually supplied.

use crate::archive::digest_of_gzip_tar;
use resourcex_util::errors::ResourceXError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Blob store contract; a blob is the gzip-compressed archive bytes keyed by
/// the `sha256:` digest of its uncompressed tar content.
pub trait BlobStore: Send + Sync {
    /// Store `bytes`, recomputing the digest and verifying it against
    /// `expected_digest` when one is supplied. Returns the digest.
    fn put(&self, bytes: &[u8], expected_digest: Option<&str>) -> Result<String, ResourceXError>;

    /// Fetch a blob by digest.
    fn get(&self, digest: &str) -> Result<Vec<u8>, ResourceXError>;

    /// Whether a blob exists for `digest`.
    fn has(&self, digest: &str) -> bool;

    /// Remove a blob. A no-op if it doesn't exist.
    fn delete(&self, digest: &str) -> Result<(), ResourceXError>;
}

fn verify_digest(bytes: &[u8], expected_digest: Option<&str>) -> Result<String, ResourceXError> {
    let computed = digest_of_gzip_tar(bytes)?;
    if let Some(expected) = expected_digest {
        if expected != computed {
            return Err(ResourceXError::digest_mismatch(format!(
                "expected {}, computed {}",
                expected, computed
            )));
        }
    }
    Ok(computed)
}

/// In-memory blob store used by tests and by the `none` execution mode.
#[derive(Default)]
pub struct MemBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemBlobStore {
    fn put(&self, bytes: &[u8], expected_digest: Option<&str>) -> Result<String, ResourceXError> {
        let digest = verify_digest(bytes, expected_digest)?;
        self.blobs
            .lock()
            .unwrap()
            .entry(digest.clone())
            .or_insert_with(|| bytes.to_vec());
        Ok(digest)
    }

    fn get(&self, digest: &str) -> Result<Vec<u8>, ResourceXError> {
        self.blobs
            .lock()
            .unwrap()
            .get(digest)
            .cloned()
            .ok_or_else(|| ResourceXError::not_found(format!("blob '{}' not found", digest)))
    }

    fn has(&self, digest: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(digest)
    }

    fn delete(&self, digest: &str) -> Result<(), ResourceXError> {
        self.blobs.lock().unwrap().remove(digest);
        Ok(())
    }
}

/// Filesystem blob store: one file per digest under `{root}/blobs/`.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ResourceXError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(ResourceXError::Transport)?;
        Ok(FsBlobStore { root })
    }

    fn path_for(&self, digest: &str) -> PathBuf {
        // Digests are `sha256:<hex64>`; split the hex into a 2-char fanout
        // directory plus the remaining 62 chars, so no single directory ends
        // up with one entry per blob in the store.
        let (_, hex) = digest.split_once(':').unwrap_or(("sha256", digest));
        let (prefix, rest) = hex.split_at(hex.len().min(2));
        self.root.join(prefix).join(rest)
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, bytes: &[u8], expected_digest: Option<&str>) -> Result<String, ResourceXError> {
        let digest = verify_digest(bytes, expected_digest)?;
        let path = self.path_for(&digest);
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(ResourceXError::Transport)?;
            }
            let tmp = path.with_extension("tmp");
            fs::write(&tmp, bytes).map_err(ResourceXError::Transport)?;
            fs::rename(&tmp, &path).map_err(ResourceXError::Transport)?;
        }
        Ok(digest)
    }

    fn get(&self, digest: &str) -> Result<Vec<u8>, ResourceXError> {
        fs::read(self.path_for(digest))
            .map_err(|_| ResourceXError::not_found(format!("blob '{}' not found", digest)))
    }

    fn has(&self, digest: &str) -> bool {
        self.path_for(digest).is_file()
    }

    fn delete(&self, digest: &str) -> Result<(), ResourceXError> {
        let path = self.path_for(digest);
        if path.exists() {
            fs::remove_file(path).map_err(ResourceXError::Transport)?;
        }
        Ok(())
    }
}

/// Shared helper: ensure a directory exists before writing into it.
pub(crate) fn ensure_dir(path: &Path) -> Result<(), ResourceXError> {
    fs::create_dir_all(path).map_err(ResourceXError::Transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Archive;

    fn sample_blob() -> (Vec<u8>, String) {
        let archive = Archive::pack_content(b"hello".to_vec()).unwrap();
        (archive.bytes().to_vec(), archive.digest().to_string())
    }

    #[test]
    fn mem_store_put_get_roundtrip() {
        let store = MemBlobStore::new();
        let (bytes, digest) = sample_blob();
        let put_digest = store.put(&bytes, None).unwrap();
        assert_eq!(put_digest, digest);
        assert!(store.has(&digest));
        assert_eq!(store.get(&digest).unwrap(), bytes);
    }

    #[test]
    fn mem_store_rejects_digest_mismatch() {
        let store = MemBlobStore::new();
        let (bytes, _) = sample_blob();
        let err = store.put(&bytes, Some("sha256:deadbeef")).unwrap_err();
        assert!(matches!(err, ResourceXError::Registry { kind: "digest-mismatch", .. }));
    }

    #[test]
    fn mem_store_get_missing_is_not_found() {
        let store = MemBlobStore::new();
        let err = store.get("sha256:absent").unwrap_err();
        assert!(matches!(err, ResourceXError::Registry { kind: "not-found", .. }));
    }

    #[test]
    fn fs_store_put_get_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();
        let (bytes, digest) = sample_blob();
        store.put(&bytes, None).unwrap();
        assert!(store.has(&digest));
        assert_eq!(store.get(&digest).unwrap(), bytes);
        store.delete(&digest).unwrap();
        assert!(!store.has(&digest));
    }

    #[test]
    fn fs_store_put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();
        let (bytes, digest) = sample_blob();
        assert_eq!(store.put(&bytes, None).unwrap(), digest);
        assert_eq!(store.put(&bytes, None).unwrap(), digest);
    }
}

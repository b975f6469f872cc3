//! Archive codec (RXA): a deterministic tar+gzip packaging of a file set.
//!
//! The archive's digest is `sha256` of the *uncompressed* canonical tar
//! bytes, so it is stable across gzip implementations and compression
//! levels (`§4.3`).

use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use resourcex_util::errors::ResourceXError;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// An opaque gzip-compressed tar of a resource's file set.
#[derive(Debug, Clone)]
pub struct Archive {
    bytes: Vec<u8>,
    digest: String,
}

impl Archive {
    /// Pack a general `path -> bytes` file map into a canonical archive.
    pub fn pack(files: &BTreeMap<String, Vec<u8>>) -> Result<Archive, ResourceXError> {
        let tar_bytes = build_canonical_tar(files)?;
        let digest = digest_hex(&tar_bytes);
        let bytes = gzip(&tar_bytes)?;
        Ok(Archive { bytes, digest })
    }

    /// Pack a single `content` buffer as the singleton map `{ "content": bytes }`.
    pub fn pack_content(content: Vec<u8>) -> Result<Archive, ResourceXError> {
        let mut files = BTreeMap::new();
        files.insert("content".to_string(), content);
        Archive::pack(&files)
    }

    /// Wrap already gzip-compressed tar bytes (e.g. read from the blob store
    /// or a network response), recomputing the digest.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Archive, ResourceXError> {
        let tar_bytes = gunzip(&bytes)?;
        let digest = digest_hex(&tar_bytes);
        Ok(Archive { bytes, digest })
    }

    /// The `sha256:<hex64>` digest of the uncompressed canonical tar bytes.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// The gzip-compressed tar bytes, as stored in the blob store.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Extract the archive into a `path -> bytes` map.
    ///
    /// Rejects symlinks, device nodes, and absolute or `..`-escaping paths.
    pub fn extract(&self) -> Result<BTreeMap<String, Vec<u8>>, ResourceXError> {
        let tar_bytes = gunzip(&self.bytes)?;
        extract_tar(&tar_bytes)
    }

    /// Read a single file out of the archive.
    pub fn file(&self, path: &str) -> Result<Vec<u8>, ResourceXError> {
        let files = self.extract()?;
        files
            .get(path)
            .cloned()
            .ok_or_else(|| ResourceXError::Content(format!("file '{}' not found in archive", path)))
    }
}

/// Compute the archive digest a set of bytes would produce, without keeping
/// the decoded archive around. Used by the store and the HTTP server to
/// verify a caller-asserted digest against uploaded content.
pub fn digest_of_gzip_tar(bytes: &[u8]) -> Result<String, ResourceXError> {
    let tar_bytes = gunzip(bytes)?;
    Ok(digest_hex(&tar_bytes))
}

fn digest_hex(tar_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tar_bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

fn build_canonical_tar(files: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>, ResourceXError> {
    let mut tar_bytes = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut tar_bytes);
        // BTreeMap iterates in ascending key order already, satisfying the
        // "sort entries by path ascending" requirement.
        for (path, data) in files {
            validate_pack_path(path)?;
            let mut header = tar::Header::new_ustar();
            header
                .set_path(path)
                .map_err(|e| ResourceXError::Content(format!("invalid path '{}': {}", path, e)))?;
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_uid(0);
            header.set_gid(0);
            header.set_mtime(0);
            header.set_cksum();
            builder
                .append(&header, data.as_slice())
                .map_err(|e| ResourceXError::Content(format!("failed to append '{}': {}", path, e)))?;
        }
        builder
            .finish()
            .map_err(|e| ResourceXError::Content(format!("failed to finalize tar: {}", e)))?;
    }
    Ok(tar_bytes)
}

fn validate_pack_path(path: &str) -> Result<(), ResourceXError> {
    if path.is_empty() || path.starts_with('/') || path.split('/').any(|c| c == "..") {
        return Err(ResourceXError::Content(format!(
            "unsafe path '{}' cannot be packed",
            path
        )));
    }
    Ok(())
}

fn gzip(tar_bytes: &[u8]) -> Result<Vec<u8>, ResourceXError> {
    let mut out = Vec::new();
    {
        // No embedded filename and a fixed mtime keep the gzip header a pure
        // function of the tar bytes, even though the digest itself only
        // depends on the uncompressed tar stream.
        let mut encoder = GzBuilder::new().mtime(0).write(&mut out, Compression::default());
        encoder
            .write_all(tar_bytes)
            .map_err(ResourceXError::Transport)?;
        encoder.finish().map_err(ResourceXError::Transport)?;
    }
    Ok(out)
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, ResourceXError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut tar_bytes = Vec::new();
    decoder
        .read_to_end(&mut tar_bytes)
        .map_err(|e| ResourceXError::Content(format!("corrupt gzip stream: {}", e)))?;
    Ok(tar_bytes)
}

fn extract_tar(tar_bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, ResourceXError> {
    let mut archive = tar::Archive::new(tar_bytes);
    let mut files = BTreeMap::new();

    let entries = archive
        .entries()
        .map_err(|e| ResourceXError::Content(format!("corrupt tar stream: {}", e)))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ResourceXError::Content(format!("corrupt tar entry: {}", e)))?;

        match entry.header().entry_type() {
            tar::EntryType::Regular | tar::EntryType::Continuous => {}
            tar::EntryType::Directory => continue,
            other => {
                return Err(ResourceXError::Content(format!(
                    "unsupported tar entry type {:?}",
                    other
                )))
            }
        }

        let path = entry
            .path()
            .map_err(|e| ResourceXError::Content(format!("invalid tar path: {}", e)))?
            .to_string_lossy()
            .into_owned();

        validate_extract_path(&path)?;

        let mut data = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut data)
            .map_err(|e| ResourceXError::Content(format!("failed to read '{}': {}", path, e)))?;

        files.insert(path, data);
    }

    Ok(files)
}

fn validate_extract_path(path: &str) -> Result<(), ResourceXError> {
    if path.starts_with('/') || path.split('/').any(|c| c == "..") {
        return Err(ResourceXError::Content(format!(
            "unsafe tar entry path '{}'",
            path
        )));
    }
    Ok(())
}

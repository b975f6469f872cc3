//! Shared server state: the CAS registry plus readiness bookkeeping.

use resourcex::store::{FsBlobStore, FsManifestStore};
use resourcex::CasRegistry;
use resourcex_util::errors::ResourceXError;
use std::path::PathBuf;
use std::sync::Arc;

/// State shared across all request handlers via `web::Data`.
pub struct AppState {
    pub cas: CasRegistry,
    pub data_root: PathBuf,
}

impl AppState {
    pub fn new(data_root: PathBuf) -> Result<AppState, ResourceXError> {
        let blobs = FsBlobStore::new(data_root.join("blobs"))?;
        let manifests = FsManifestStore::new(data_root.join("manifests"))?;
        Ok(AppState {
            cas: CasRegistry::new(Arc::new(blobs), Arc::new(manifests)),
            data_root,
        })
    }

    /// Readiness means the data root is still a writable directory.
    pub fn is_ready(&self) -> bool {
        self.data_root.is_dir()
    }
}

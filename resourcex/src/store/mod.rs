//! The blob store (RXAStore) and manifest store (RXMStore) that back the
//! content-addressed registry (`§4.4`).

pub mod blob;
pub mod manifest_store;

pub use blob::{BlobStore, FsBlobStore, MemBlobStore};
pub use manifest_store::{FsManifestStore, LatestKey, ManifestKey, ManifestStore, MemManifestStore};

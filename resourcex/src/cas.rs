// Copyright 2018 Alex Crawford
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! CASRegistry (C5): the local content-addressed registry, composing the
//! archive codec (C3) with the blob and manifest stores (C4).

use crate::archive::Archive;
use crate::identifier::Identifier;
use crate::manifest::Manifest;
use crate::resource::Resource;
use crate::store::{BlobStore, LatestKey, ManifestKey, ManifestStore};
use resourcex_util::errors::ResourceXError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Composes a blob store and a manifest store into the local store contract
/// described by `§4.5`.
pub struct CasRegistry {
    blobs: Arc<dyn BlobStore>,
    manifests: Arc<dyn ManifestStore>,
    /// One lock per `(registry, path, name, tag)`, so a publish to `x:1`
    /// never blocks a concurrent publish to `y:1`.
    publish_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CasRegistry {
    pub fn new(blobs: Arc<dyn BlobStore>, manifests: Arc<dyn ManifestStore>) -> CasRegistry {
        CasRegistry {
            blobs,
            manifests,
            publish_locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, identifier: &Identifier) -> Arc<Mutex<()>> {
        let key = format!(
            "{}/{}/{}:{}",
            identifier.registry.as_deref().unwrap_or(""),
            identifier.path.as_deref().unwrap_or(""),
            identifier.name,
            identifier.tag_or_default()
        );
        self.publish_locks.lock().unwrap().entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// `put(r)`: pack (already packed) the archive, store the blob, write the
    /// manifest with its digest, and set the `latest` pointer to this tag.
    /// Idempotent on an identical `(id, digest)` pair.
    pub fn put(&self, identifier: &Identifier, mut manifest: Manifest, archive: Archive) -> Result<Resource, ResourceXError> {
        let lock = self.lock_for(identifier);
        let _guard = lock.lock().unwrap();

        let tag = identifier.tag_or_default().to_string();
        let digest = self.blobs.put(archive.bytes(), manifest.archive.digest.as_deref())?;
        manifest.archive.digest = Some(digest);

        let key = ManifestKey {
            registry: identifier.registry.clone(),
            path: identifier.path.clone(),
            name: identifier.name.clone(),
            type_name: manifest.definition.type_name.clone(),
            tag: tag.clone(),
        };
        self.manifests.put_tag(&key, &manifest)?;
        self.manifests.set_latest(&key.latest_key(), &tag)?;

        let resolved_identifier = Identifier {
            tag: Some(tag),
            ..identifier.clone()
        };
        Resource::new(resolved_identifier, manifest, archive)
    }

    /// `get(id)`: resolve the tag, read the manifest, fetch the blob.
    pub fn get(&self, identifier: &Identifier) -> Result<Resource, ResourceXError> {
        let key = self.resolve_key(identifier)?;
        let manifest = self.manifests.get_tag(&key)?;
        self.verify_digest_pin(identifier, &manifest)?;
        let digest = manifest
            .archive
            .digest
            .clone()
            .ok_or_else(|| ResourceXError::Manifest("stored manifest has no archive digest".to_string()))?;
        let bytes = self.blobs.get(&digest)?;
        let archive = Archive::from_bytes(bytes)?;
        let resolved_identifier = Identifier {
            tag: Some(key.tag.clone()),
            ..identifier.clone()
        };
        Resource::new(resolved_identifier, manifest, archive)
    }

    /// `has(id)`: same tag resolution as `get`, without fetching the blob.
    pub fn has(&self, identifier: &Identifier) -> bool {
        self.resolve_key(identifier)
            .map(|key| self.manifests.has_tag(&key))
            .unwrap_or(false)
    }

    /// `remove(id)`: delete the tag entry; clear the `latest` pointer if it
    /// pointed here. Never deletes the blob, which may be shared.
    pub fn remove(&self, identifier: &Identifier) -> Result<(), ResourceXError> {
        let key = self.resolve_key(identifier)?;
        self.manifests.delete_tag(&key)?;
        self.manifests.clear_latest_if(&key.latest_key(), &key.tag)?;
        Ok(())
    }

    /// `list(filter?)`: enumerate manifest entries matching a case-insensitive
    /// substring filter, paginated by `limit`/`offset`.
    pub fn list(&self, filter: Option<&str>, limit: Option<usize>, offset: usize) -> Vec<Identifier> {
        self.manifests
            .list(filter, limit, offset)
            .into_iter()
            .map(|key| Identifier {
                registry: key.registry,
                path: key.path,
                name: key.name,
                tag: Some(key.tag),
                digest: None,
            })
            .collect()
    }

    /// `clearCache(registry?)`: remove manifest entries whose `registry`
    /// matches, or all non-local entries if none is given.
    pub fn clear_cache(&self, registry: Option<&str>) -> Result<(), ResourceXError> {
        for key in self.manifests.list(None, None, 0) {
            let matches = match registry {
                Some(r) => key.registry.as_deref() == Some(r),
                None => key.registry.is_some(),
            };
            if matches {
                self.manifests.delete_tag(&key)?;
                self.manifests.clear_latest_if(&key.latest_key(), &key.tag)?;
            }
        }
        Ok(())
    }

    /// `getStoredManifest(id)`: a cheap metadata-only read, used by the
    /// registry chain's freshness check.
    pub fn get_stored_manifest(&self, identifier: &Identifier) -> Result<Manifest, ResourceXError> {
        let key = self.resolve_key(identifier)?;
        self.manifests.get_tag(&key)
    }

    fn verify_digest_pin(&self, identifier: &Identifier, manifest: &Manifest) -> Result<(), ResourceXError> {
        if let Some(expected) = &identifier.digest {
            if manifest.archive.digest.as_deref() != Some(expected.as_str()) {
                return Err(ResourceXError::digest_mismatch(format!(
                    "locator pins {} but stored tag resolves to {:?}",
                    expected, manifest.archive.digest
                )));
            }
        }
        Ok(())
    }

    /// Resolve an identifier (which never carries a `type`) to the unique
    /// manifest key it names: explicit digest > exact tag > `latest` pointer.
    fn resolve_key(&self, identifier: &Identifier) -> Result<ManifestKey, ResourceXError> {
        let type_name = self.unique_type_for(identifier)?;
        let latest_key = LatestKey {
            registry: identifier.registry.clone(),
            path: identifier.path.clone(),
            name: identifier.name.clone(),
            type_name: type_name.clone(),
        };
        let tag = match &identifier.tag {
            Some(tag) => tag.clone(),
            None => self
                .manifests
                .get_latest(&latest_key)
                .ok_or_else(|| ResourceXError::not_found(format!("no 'latest' tag for '{}'", identifier)))?,
        };
        Ok(ManifestKey {
            registry: identifier.registry.clone(),
            path: identifier.path.clone(),
            name: identifier.name.clone(),
            type_name,
            tag,
        })
    }

    /// Find the single resource type registered under this identifier's
    /// `(registry, path, name)`. Locators don't carry a type, so the store is
    /// consulted to disambiguate; more than one distinct type is an error.
    fn unique_type_for(&self, identifier: &Identifier) -> Result<String, ResourceXError> {
        let mut types: Vec<String> = self
            .manifests
            .list(None, None, 0)
            .into_iter()
            .filter(|key| {
                key.registry == identifier.registry && key.path == identifier.path && key.name == identifier.name
            })
            .map(|key| key.type_name)
            .collect();
        types.sort();
        types.dedup();
        match types.as_slice() {
            [] => Err(ResourceXError::not_found(format!("'{}' not found", identifier))),
            [single] => Ok(single.clone()),
            _ => Err(ResourceXError::ResourceType(format!(
                "'{}' is ambiguous across types {:?}",
                identifier, types
            ))),
        }
    }
}

//! RXMStore: the tag-addressed manifest store (`§4.4`).

use crate::manifest::Manifest;
use crate::store::blob::ensure_dir;
use resourcex_util::errors::ResourceXError;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// The coordinates of a single tagged manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ManifestKey {
    pub registry: Option<String>,
    pub path: Option<String>,
    pub name: String,
    pub type_name: String,
    pub tag: String,
}

/// The coordinates of a `latest` pointer: a [`ManifestKey`] without its tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LatestKey {
    pub registry: Option<String>,
    pub path: Option<String>,
    pub name: String,
    pub type_name: String,
}

impl ManifestKey {
    pub fn latest_key(&self) -> LatestKey {
        LatestKey {
            registry: self.registry.clone(),
            path: self.path.clone(),
            name: self.name.clone(),
            type_name: self.type_name.clone(),
        }
    }

    fn haystack(&self) -> String {
        format!(
            "{} {} {} {}",
            self.registry.as_deref().unwrap_or(""),
            self.path.as_deref().unwrap_or(""),
            self.name,
            self.type_name
        )
        .to_lowercase()
    }
}

/// Manifest store contract.
pub trait ManifestStore: Send + Sync {
    fn put_tag(&self, key: &ManifestKey, manifest: &Manifest) -> Result<(), ResourceXError>;
    fn get_tag(&self, key: &ManifestKey) -> Result<Manifest, ResourceXError>;
    fn has_tag(&self, key: &ManifestKey) -> bool;
    fn delete_tag(&self, key: &ManifestKey) -> Result<(), ResourceXError>;

    fn set_latest(&self, key: &LatestKey, tag: &str) -> Result<(), ResourceXError>;
    fn get_latest(&self, key: &LatestKey) -> Option<String>;
    fn clear_latest_if(&self, key: &LatestKey, tag: &str) -> Result<(), ResourceXError>;

    /// Enumerate manifest entries, optionally filtered by a case-insensitive
    /// substring match and paginated by `limit`/`offset`.
    fn list(&self, filter: Option<&str>, limit: Option<usize>, offset: usize) -> Vec<ManifestKey>;
}

/// In-memory manifest store used by tests and by the `none` execution mode.
#[derive(Default)]
pub struct MemManifestStore {
    tags: Mutex<BTreeMap<ManifestKey, Manifest>>,
    latest: Mutex<BTreeMap<LatestKey, String>>,
}

impl MemManifestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ManifestStore for MemManifestStore {
    fn put_tag(&self, key: &ManifestKey, manifest: &Manifest) -> Result<(), ResourceXError> {
        self.tags.lock().unwrap().insert(key.clone(), manifest.clone());
        Ok(())
    }

    fn get_tag(&self, key: &ManifestKey) -> Result<Manifest, ResourceXError> {
        self.tags
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| ResourceXError::not_found(format!("tag '{}' not found", key.tag)))
    }

    fn has_tag(&self, key: &ManifestKey) -> bool {
        self.tags.lock().unwrap().contains_key(key)
    }

    fn delete_tag(&self, key: &ManifestKey) -> Result<(), ResourceXError> {
        self.tags.lock().unwrap().remove(key);
        Ok(())
    }

    fn set_latest(&self, key: &LatestKey, tag: &str) -> Result<(), ResourceXError> {
        self.latest.lock().unwrap().insert(key.clone(), tag.to_string());
        Ok(())
    }

    fn get_latest(&self, key: &LatestKey) -> Option<String> {
        self.latest.lock().unwrap().get(key).cloned()
    }

    fn clear_latest_if(&self, key: &LatestKey, tag: &str) -> Result<(), ResourceXError> {
        let mut latest = self.latest.lock().unwrap();
        if latest.get(key).map(String::as_str) == Some(tag) {
            latest.remove(key);
        }
        Ok(())
    }

    fn list(&self, filter: Option<&str>, limit: Option<usize>, offset: usize) -> Vec<ManifestKey> {
        let filter = filter.map(str::to_lowercase);
        let mut keys: Vec<ManifestKey> = self
            .tags
            .lock()
            .unwrap()
            .keys()
            .filter(|k| filter.as_deref().map_or(true, |f| k.haystack().contains(f)))
            .cloned()
            .collect();
        keys.sort();
        paginate(keys, limit, offset)
    }
}

fn paginate(keys: Vec<ManifestKey>, limit: Option<usize>, offset: usize) -> Vec<ManifestKey> {
    let rest: Vec<ManifestKey> = keys.into_iter().skip(offset).collect();
    match limit {
        Some(limit) => rest.into_iter().take(limit).collect(),
        None => rest,
    }
}

/// Filesystem manifest store:
/// `{root}/{registry|"local"}/{path…}/{name}.{type}/{tag}/manifest.json`
/// with a sibling `.latest` file at `{root}/.../{name}.{type}/.latest`.
pub struct FsManifestStore {
    root: PathBuf,
}

impl FsManifestStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ResourceXError> {
        let root = root.into();
        ensure_dir(&root)?;
        Ok(FsManifestStore { root })
    }

    fn resource_dir(&self, registry: Option<&str>, path: Option<&str>, name: &str, type_name: &str) -> PathBuf {
        let mut dir = self.root.join(registry.unwrap_or("local"));
        if let Some(path) = path {
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                dir = dir.join(segment);
            }
        }
        dir.join(format!("{}.{}", name, type_name))
    }

    fn tag_dir(&self, key: &ManifestKey) -> PathBuf {
        self.resource_dir(key.registry.as_deref(), key.path.as_deref(), &key.name, &key.type_name)
            .join(&key.tag)
    }

    fn latest_path(&self, key: &LatestKey) -> PathBuf {
        self.resource_dir(key.registry.as_deref(), key.path.as_deref(), &key.name, &key.type_name)
            .join(".latest")
    }

    fn manifest_path(&self, key: &ManifestKey) -> PathBuf {
        self.tag_dir(key).join("manifest.json")
    }
}

impl ManifestStore for FsManifestStore {
    fn put_tag(&self, key: &ManifestKey, manifest: &Manifest) -> Result<(), ResourceXError> {
        let dir = self.tag_dir(key);
        ensure_dir(&dir)?;
        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| ResourceXError::Manifest(format!("failed to serialize manifest: {}", e)))?;
        let path = self.manifest_path(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json).map_err(ResourceXError::Transport)?;
        fs::rename(&tmp, &path).map_err(ResourceXError::Transport)?;
        Ok(())
    }

    fn get_tag(&self, key: &ManifestKey) -> Result<Manifest, ResourceXError> {
        let bytes = fs::read(self.manifest_path(key))
            .map_err(|_| ResourceXError::not_found(format!("tag '{}' not found", key.tag)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ResourceXError::Manifest(format!("corrupt manifest on disk: {}", e)))
    }

    fn has_tag(&self, key: &ManifestKey) -> bool {
        self.manifest_path(key).is_file()
    }

    fn delete_tag(&self, key: &ManifestKey) -> Result<(), ResourceXError> {
        let dir = self.tag_dir(key);
        if dir.exists() {
            fs::remove_dir_all(dir).map_err(ResourceXError::Transport)?;
        }
        Ok(())
    }

    fn set_latest(&self, key: &LatestKey, tag: &str) -> Result<(), ResourceXError> {
        let path = self.latest_path(key);
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, tag).map_err(ResourceXError::Transport)?;
        fs::rename(&tmp, &path).map_err(ResourceXError::Transport)
    }

    fn get_latest(&self, key: &LatestKey) -> Option<String> {
        fs::read_to_string(self.latest_path(key)).ok()
    }

    fn clear_latest_if(&self, key: &LatestKey, tag: &str) -> Result<(), ResourceXError> {
        if self.get_latest(key).as_deref() == Some(tag) {
            let path = self.latest_path(key);
            if path.exists() {
                fs::remove_file(path).map_err(ResourceXError::Transport)?;
            }
        }
        Ok(())
    }

    fn list(&self, filter: Option<&str>, limit: Option<usize>, offset: usize) -> Vec<ManifestKey> {
        let filter = filter.map(str::to_lowercase);
        let mut keys = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_name() == "manifest.json")
        {
            if let Some(key) = self.key_from_manifest_path(entry.path()) {
                if filter.as_deref().map_or(true, |f| key.haystack().contains(f)) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        paginate(keys, limit, offset)
    }
}

impl FsManifestStore {
    fn key_from_manifest_path(&self, path: &std::path::Path) -> Option<ManifestKey> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut components: Vec<&str> = relative
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect();
        // [..., registry, path segments..., "name.type", tag, "manifest.json"]
        components.pop()?; // manifest.json
        let tag = components.pop()?.to_string();
        let name_type = components.pop()?;
        let (name, type_name) = name_type.rsplit_once('.')?;
        let registry = components.remove(0);
        let registry = if registry == "local" { None } else { Some(registry.to_string()) };
        let path = if components.is_empty() {
            None
        } else {
            Some(components.join("/"))
        };
        Some(ManifestKey {
            registry,
            path,
            name: name.to_string(),
            type_name: type_name.to_string(),
            tag,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Definition, DefinitionInput};

    fn sample_key(tag: &str) -> ManifestKey {
        ManifestKey {
            registry: None,
            path: Some("team".to_string()),
            name: "hello".to_string(),
            type_name: "text".to_string(),
            tag: tag.to_string(),
        }
    }

    fn sample_manifest(tag: &str) -> Manifest {
        Manifest {
            definition: Definition::from_input(DefinitionInput {
                name: Some("hello".to_string()),
                type_name: Some("text".to_string()),
                path: Some("team".to_string()),
                tag: Some(tag.to_string()),
                ..Default::default()
            })
            .unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn mem_store_put_get_and_latest() {
        let store = MemManifestStore::new();
        let key = sample_key("1.0");
        store.put_tag(&key, &sample_manifest("1.0")).unwrap();
        assert!(store.has_tag(&key));
        store.set_latest(&key.latest_key(), "1.0").unwrap();
        assert_eq!(store.get_latest(&key.latest_key()).as_deref(), Some("1.0"));
    }

    #[test]
    fn mem_store_clear_latest_only_if_matching() {
        let store = MemManifestStore::new();
        let key = sample_key("1.0");
        store.set_latest(&key.latest_key(), "1.0").unwrap();
        store.clear_latest_if(&key.latest_key(), "2.0").unwrap();
        assert_eq!(store.get_latest(&key.latest_key()).as_deref(), Some("1.0"));
        store.clear_latest_if(&key.latest_key(), "1.0").unwrap();
        assert_eq!(store.get_latest(&key.latest_key()), None);
    }

    #[test]
    fn mem_store_list_filters_case_insensitively() {
        let store = MemManifestStore::new();
        store.put_tag(&sample_key("1.0"), &sample_manifest("1.0")).unwrap();
        assert_eq!(store.list(Some("HELLO"), None, 0).len(), 1);
        assert_eq!(store.list(Some("nope"), None, 0).len(), 0);
    }

    #[test]
    fn fs_store_roundtrips_through_directory_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsManifestStore::new(dir.path()).unwrap();
        let key = sample_key("1.0");
        store.put_tag(&key, &sample_manifest("1.0")).unwrap();
        store.set_latest(&key.latest_key(), "1.0").unwrap();

        assert!(store.has_tag(&key));
        assert_eq!(store.get_tag(&key).unwrap().definition.name, "hello");
        assert_eq!(store.get_latest(&key.latest_key()).as_deref(), Some("1.0"));

        let listed = store.list(None, None, 0);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], key);
    }

    #[test]
    fn fs_store_delete_tag_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsManifestStore::new(dir.path()).unwrap();
        let key = sample_key("1.0");
        store.put_tag(&key, &sample_manifest("1.0")).unwrap();
        store.delete_tag(&key).unwrap();
        assert!(!store.has_tag(&key));
    }
}

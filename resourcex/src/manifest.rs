//! Manifest (RXM): typed metadata describing a resource.

use resourcex_util::errors::ResourceXError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_TAG: &str = "latest";
const PREVIEW_CANDIDATES: &[&str] = &["SKILL.md", "content", "README.md", "index.md"];
const PREVIEW_MAX_LEN: usize = 500;

/// The authoritative identity and human-facing metadata of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

fn default_tag() -> String {
    DEFAULT_TAG.to_string()
}

/// Input record used to build a [`Definition`]; only `name` and `type_name`
/// are required, everything else defaults. Deserialisable so a `resource.json`
/// indicator file can be read directly into one (`§4.6`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefinitionInput {
    #[serde(default)]
    pub registry: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub repository: Option<String>,
}

impl DefinitionInput {
    /// Overlay `other`'s set fields onto `self`, preferring `other` (used to
    /// apply caller overrides on top of a detected `resource.json`).
    pub fn merged_with(self, other: DefinitionInput) -> DefinitionInput {
        DefinitionInput {
            registry: other.registry.or(self.registry),
            path: other.path.or(self.path),
            name: other.name.or(self.name),
            type_name: other.type_name.or(self.type_name),
            tag: other.tag.or(self.tag),
            description: other.description.or(self.description),
            author: other.author.or(self.author),
            license: other.license.or(self.license),
            keywords: if other.keywords.is_empty() { self.keywords } else { other.keywords },
            repository: other.repository.or(self.repository),
        }
    }
}

impl Definition {
    /// Build a definition from an input record, applying the `tag` default
    /// and rejecting missing required fields.
    pub fn from_input(input: DefinitionInput) -> Result<Definition, ResourceXError> {
        let name = input
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ResourceXError::Manifest("missing required field 'name'".to_string()))?;
        let type_name = input
            .type_name
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ResourceXError::Manifest("missing required field 'type'".to_string()))?;

        Ok(Definition {
            registry: input.registry,
            path: input.path,
            name,
            type_name,
            tag: input.tag.unwrap_or_else(default_tag),
            description: input.description,
            author: input.author,
            license: input.license,
            keywords: input.keywords,
            repository: input.repository,
        })
    }

    /// Render this definition's identity as a canonical locator string.
    pub fn to_locator(&self) -> String {
        let id = crate::identifier::Identifier {
            registry: self.registry.clone(),
            path: self.path.clone(),
            name: self.name.clone(),
            tag: Some(self.tag.clone()),
            digest: None,
        };
        crate::identifier::format(&id)
    }
}

/// The sha256 digest of the archive blob, populated on `put`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// A single entry in the recursive file tree (`§3`); directories carry
/// nested `entries`, files carry only a `size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FileTreeEntry {
    File { size: u64 },
    Dir { entries: BTreeMap<String, FileTreeEntry> },
}

/// Derived, non-authoritative metadata about the packed file set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    #[serde(default)]
    pub files: BTreeMap<String, FileTreeEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl SourceInfo {
    /// Build source info (file tree + preview) from a packed file set.
    pub fn from_files(files: &BTreeMap<String, Vec<u8>>) -> SourceInfo {
        SourceInfo {
            files: build_file_tree(files),
            preview: build_preview(files),
        }
    }
}

fn build_file_tree(files: &BTreeMap<String, Vec<u8>>) -> BTreeMap<String, FileTreeEntry> {
    let mut root: BTreeMap<String, FileTreeEntry> = BTreeMap::new();
    for (path, bytes) in files {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        insert_entry(&mut root, &components, bytes.len() as u64);
    }
    root
}

fn insert_entry(level: &mut BTreeMap<String, FileTreeEntry>, components: &[&str], size: u64) {
    match components {
        [] => {}
        [leaf] => {
            level.insert((*leaf).to_string(), FileTreeEntry::File { size });
        }
        [head, tail @ ..] => {
            let entry = level.entry((*head).to_string()).or_insert_with(|| FileTreeEntry::Dir {
                entries: BTreeMap::new(),
            });
            if let FileTreeEntry::Dir { entries } = entry {
                insert_entry(entries, tail, size);
            }
        }
    }
}

fn build_preview(files: &BTreeMap<String, Vec<u8>>) -> Option<String> {
    let primary = PREVIEW_CANDIDATES
        .iter()
        .find_map(|candidate| files.get(*candidate).map(|bytes| bytes.as_slice()))
        .or_else(|| {
            files
                .iter()
                .filter(|(_, bytes)| bytes.len() <= 64 * 1024 && std::str::from_utf8(bytes).is_ok())
                .min_by_key(|(path, _)| path.as_str())
                .map(|(_, bytes)| bytes.as_slice())
        })?;

    let text = String::from_utf8_lossy(primary);
    Some(truncate_chars(&text, PREVIEW_MAX_LEN))
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// The full manifest: identity, archive pointer, and derived source info.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub definition: Definition,
    #[serde(default)]
    pub archive: ArchiveRef,
    #[serde(default)]
    pub source: SourceInfo,
}

impl Default for Definition {
    fn default() -> Self {
        Definition {
            registry: None,
            path: None,
            name: String::new(),
            type_name: String::new(),
            tag: default_tag(),
            description: None,
            author: None,
            license: None,
            keywords: Vec::new(),
            repository: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_input_requires_name_and_type() {
        let err = Definition::from_input(DefinitionInput::default()).unwrap_err();
        assert!(matches!(err, ResourceXError::Manifest(_)));
    }

    #[test]
    fn from_input_defaults_tag_to_latest() {
        let def = Definition::from_input(DefinitionInput {
            name: Some("hello".to_string()),
            type_name: Some("text".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(def.tag, "latest");
    }

    #[test]
    fn to_locator_formats_identity() {
        let def = Definition::from_input(DefinitionInput {
            name: Some("hello".to_string()),
            type_name: Some("text".to_string()),
            tag: Some("1.0".to_string()),
            path: Some("team".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(def.to_locator(), "team/hello:1.0");
    }

    #[test]
    fn file_tree_nests_directories() {
        let mut files = BTreeMap::new();
        files.insert("content".to_string(), b"hi".to_vec());
        files.insert("references/a.md".to_string(), b"aaa".to_vec());
        let tree = build_file_tree(&files);
        assert!(matches!(tree.get("content"), Some(FileTreeEntry::File { size: 2 })));
        match tree.get("references") {
            Some(FileTreeEntry::Dir { entries }) => {
                assert!(matches!(entries.get("a.md"), Some(FileTreeEntry::File { size: 3 })));
            }
            other => panic!("expected dir, got {:?}", other),
        }
    }

    #[test]
    fn preview_prefers_skill_md() {
        let mut files = BTreeMap::new();
        files.insert("content".to_string(), b"not this".to_vec());
        files.insert("SKILL.md".to_string(), b"the skill".to_vec());
        assert_eq!(build_preview(&files).as_deref(), Some("the skill"));
    }

    #[test]
    fn preview_falls_back_to_smallest_text_file() {
        let mut files = BTreeMap::new();
        files.insert("notes.txt".to_string(), b"fallback".to_vec());
        assert_eq!(build_preview(&files).as_deref(), Some("fallback"));
    }

    #[test]
    fn manifest_json_omits_empty_optionals() {
        let manifest = Manifest {
            definition: Definition::from_input(DefinitionInput {
                name: Some("hello".to_string()),
                type_name: Some("text".to_string()),
                ..Default::default()
            })
            .unwrap(),
            ..Default::default()
        };
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(!json.contains("\"registry\""));
        assert!(!json.contains("\"description\""));
    }
}

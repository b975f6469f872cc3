//! The folder loader: the built-in [`super::SourceLoader`] for on-disk
//! directory sources (`§4.6`).

use crate::archive::Archive;
use crate::manifest::{Definition, DefinitionInput, Manifest, SourceInfo};
use crate::source::SourceLoader;
use resourcex_util::errors::ResourceXError;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const RESOURCE_JSON: &str = "resource.json";
const SKILL_MD: &str = "SKILL.md";
const PROTOTYPE_JSON: &str = "prototype.json";
const EXCLUDED_DIRS: &[&str] = &[".git", "node_modules"];

/// Detects a directory as a resource by the first indicator that matches:
/// `resource.json`, then `SKILL.md`, then `prototype.json`.
#[derive(Default)]
pub struct FolderLoader;

impl FolderLoader {
    pub fn new() -> FolderLoader {
        FolderLoader
    }
}

/// Which indicator file matched, first-match-wins.
enum Indicator {
    ResourceJson,
    SkillMd,
    PrototypeJson,
}

impl SourceLoader for FolderLoader {
    fn can_load(&self, source: &Path) -> bool {
        source.is_dir() && detect_indicator(source).is_some()
    }

    fn load(&self, source: &Path, overrides: &DefinitionInput) -> Result<(Manifest, Archive), ResourceXError> {
        let indicator = detect_indicator(source).ok_or_else(|| {
            ResourceXError::Manifest(format!(
                "'{}' has no resource.json, SKILL.md, or prototype.json",
                source.display()
            ))
        })?;

        let detected = read_resource_json(source)?.unwrap_or_default();
        let name_fallback = source
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| ResourceXError::Manifest("source path has no file name".to_string()))?;

        let default_type = match indicator {
            Indicator::ResourceJson => None,
            Indicator::SkillMd => Some("skill".to_string()),
            Indicator::PrototypeJson => Some("prototype".to_string()),
        };

        let input = DefinitionInput {
            type_name: detected.type_name.clone().or(default_type),
            name: detected.name.clone().or(Some(name_fallback)),
            ..detected
        }
        .merged_with(overrides.clone());

        let definition = Definition::from_input(input)?;
        let files = read_files(source)?;
        let source_info = SourceInfo::from_files(&files);
        let archive = Archive::pack(&files)?;

        let manifest = Manifest {
            definition,
            archive: Default::default(),
            source: source_info,
        };
        Ok((manifest, archive))
    }
}

fn detect_indicator(source: &Path) -> Option<Indicator> {
    if source.join(RESOURCE_JSON).is_file() {
        Some(Indicator::ResourceJson)
    } else if source.join(SKILL_MD).is_file() {
        Some(Indicator::SkillMd)
    } else if source.join(PROTOTYPE_JSON).is_file() {
        Some(Indicator::PrototypeJson)
    } else {
        None
    }
}

fn read_resource_json(source: &Path) -> Result<Option<DefinitionInput>, ResourceXError> {
    let path = source.join(RESOURCE_JSON);
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(&path).map_err(ResourceXError::Transport)?;
    let input: DefinitionInput = serde_json::from_slice(&bytes)
        .map_err(|e| ResourceXError::Manifest(format!("invalid resource.json: {}", e)))?;
    Ok(Some(input))
}

fn read_files(source: &Path) -> Result<BTreeMap<String, Vec<u8>>, ResourceXError> {
    let mut files = BTreeMap::new();
    for entry in walkdir::WalkDir::new(source)
        .into_iter()
        .filter_entry(|e| e.path() == source || !is_excluded(e.file_name()))
    {
        let entry = entry.map_err(|e| ResourceXError::Transport(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source)
            .expect("walkdir entries are rooted at source")
            .to_string_lossy()
            .replace('\\', "/");
        if relative == RESOURCE_JSON {
            continue;
        }
        let bytes = fs::read(entry.path()).map_err(ResourceXError::Transport)?;
        files.insert(relative, bytes);
    }
    Ok(files)
}

fn is_excluded(name: &std::ffi::OsStr) -> bool {
    EXCLUDED_DIRS.iter().any(|excluded| name == *excluded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn detects_skill_when_no_resource_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("SKILL.md"), "do the thing").unwrap();

        let loader = FolderLoader::new();
        assert!(loader.can_load(dir.path()));
        let (manifest, _archive) = loader.load(dir.path(), &DefinitionInput::default()).unwrap();
        assert_eq!(manifest.definition.type_name, "skill");
        assert_eq!(
            manifest.definition.name,
            dir.path().file_name().unwrap().to_str().unwrap()
        );
    }

    #[test]
    fn resource_json_is_authoritative_over_skill_md() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("SKILL.md"), "ignored type hint").unwrap();
        fs::write(
            dir.path().join("resource.json"),
            r#"{"name":"custom","type":"text","tag":"1.0"}"#,
        )
        .unwrap();

        let loader = FolderLoader::new();
        let (manifest, _) = loader.load(dir.path(), &DefinitionInput::default()).unwrap();
        assert_eq!(manifest.definition.name, "custom");
        assert_eq!(manifest.definition.type_name, "text");
        assert_eq!(manifest.definition.tag, "1.0");
    }

    #[test]
    fn excludes_git_and_node_modules_and_resource_json_itself() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("resource.json"), r#"{"name":"x","type":"text"}"#).unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git").join("HEAD"), "ref: refs/heads/main").unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules").join("pkg.js"), "noise").unwrap();
        fs::write(dir.path().join("content"), "hello").unwrap();

        let loader = FolderLoader::new();
        let (manifest, archive) = loader.load(dir.path(), &DefinitionInput::default()).unwrap();
        let extracted = archive.extract().unwrap();
        assert_eq!(extracted.len(), 1);
        assert!(extracted.contains_key("content"));
        assert!(!manifest.source.files.contains_key("resource.json"));
        assert!(!manifest.source.files.contains_key(".git"));
    }

    #[test]
    fn not_a_resource_without_any_indicator() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "just a file").unwrap();
        assert!(!FolderLoader::new().can_load(dir.path()));
    }

    #[test]
    fn overrides_win_over_detected_fields() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("resource.json"),
            r#"{"name":"custom","type":"text","tag":"1.0"}"#,
        )
        .unwrap();

        let overrides = DefinitionInput {
            tag: Some("2.0".to_string()),
            ..Default::default()
        };
        let (manifest, _) = FolderLoader::new().load(dir.path(), &overrides).unwrap();
        assert_eq!(manifest.definition.tag, "2.0");
        assert_eq!(manifest.definition.name, "custom");
    }
}

//! Resource (RXR): the `(identifier, manifest, archive)` triple (`§3`).

use crate::archive::Archive;
use crate::identifier::Identifier;
use crate::manifest::Manifest;
use resourcex_util::errors::ResourceXError;

/// A fully resolved resource: its identity, its typed metadata, and its
/// packed content.
#[derive(Debug, Clone)]
pub struct Resource {
    pub identifier: Identifier,
    pub manifest: Manifest,
    pub archive: Archive,
}

impl Resource {
    /// Build a resource, checking the invariants from `§3`: the identifier
    /// and the manifest's definition must agree on identity, and a manifest
    /// digest (if set) must match the archive it's paired with.
    pub fn new(identifier: Identifier, manifest: Manifest, archive: Archive) -> Result<Resource, ResourceXError> {
        let def = &manifest.definition;
        if identifier.name != def.name {
            return Err(ResourceXError::Manifest(format!(
                "identifier name '{}' does not match definition name '{}'",
                identifier.name, def.name
            )));
        }
        if identifier.path.as_deref().unwrap_or("") != def.path.as_deref().unwrap_or("") {
            return Err(ResourceXError::Manifest(
                "identifier path does not match definition path".to_string(),
            ));
        }
        if identifier.registry.as_deref().unwrap_or("") != def.registry.as_deref().unwrap_or("") {
            return Err(ResourceXError::Manifest(
                "identifier registry does not match definition registry".to_string(),
            ));
        }
        if identifier.tag_or_default() != def.tag {
            return Err(ResourceXError::Manifest(
                "identifier tag does not match definition tag".to_string(),
            ));
        }
        if let Some(expected) = &manifest.archive.digest {
            if expected != archive.digest() {
                return Err(ResourceXError::digest_mismatch(format!(
                    "manifest declares digest {} but archive digest is {}",
                    expected,
                    archive.digest()
                )));
            }
        }
        Ok(Resource {
            identifier,
            manifest,
            archive,
        })
    }
}

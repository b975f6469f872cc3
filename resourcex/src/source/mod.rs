//! Source loader chain (C6): turns an on-disk source into a packed manifest
//! and archive, trying each registered loader in order.

pub mod folder;

use crate::manifest::{DefinitionInput, Manifest};
use crate::archive::Archive;
use resourcex_util::errors::ResourceXError;
use std::path::Path;

/// A chain-of-responsibility loader: `can_load` gates whether `load` is tried.
pub trait SourceLoader: Send + Sync {
    fn can_load(&self, source: &Path) -> bool;
    fn load(&self, source: &Path, overrides: &DefinitionInput) -> Result<(Manifest, Archive), ResourceXError>;
}

/// Tries each loader in registration order, returning the first that accepts
/// the source.
#[derive(Default)]
pub struct SourceLoaderChain {
    loaders: Vec<Box<dyn SourceLoader>>,
}

impl SourceLoaderChain {
    pub fn new() -> SourceLoaderChain {
        SourceLoaderChain { loaders: Vec::new() }
    }

    /// The chain with the built-in folder loader registered.
    pub fn with_defaults() -> SourceLoaderChain {
        let mut chain = SourceLoaderChain::new();
        chain.register(Box::new(folder::FolderLoader::new()));
        chain
    }

    pub fn register(&mut self, loader: Box<dyn SourceLoader>) {
        self.loaders.push(loader);
    }

    pub fn can_load(&self, source: &Path) -> bool {
        self.loaders.iter().any(|loader| loader.can_load(source))
    }

    pub fn load(&self, source: &Path, overrides: &DefinitionInput) -> Result<(Manifest, Archive), ResourceXError> {
        for loader in &self.loaders {
            if loader.can_load(source) {
                return loader.load(source, overrides);
            }
        }
        Err(ResourceXError::Manifest(format!(
            "no loader recognises source '{}'",
            source.display()
        )))
    }
}

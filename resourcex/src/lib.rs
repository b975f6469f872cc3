//! The ResourceX engine: locators, manifests, archives, the local
//! content-addressed store, the source loader chain, the type-handler
//! chain, and the resolver executor.

pub mod archive;
pub mod cas;
pub mod exec;
pub mod identifier;
pub mod manifest;
pub mod resource;
pub mod source;
pub mod store;
pub mod types;

pub use archive::Archive;
pub use cas::CasRegistry;
pub use exec::{Executor, ResolveContext, ResolvedValue, Sandbox, SandboxOutput};
pub use identifier::Identifier;
pub use manifest::{Definition, DefinitionInput, Manifest};
pub use resource::Resource;
pub use types::{TypeHandler, TypeRegistry};

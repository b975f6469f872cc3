//! Type-handler chain (C7): a registry of resource types, each exposing a
//! resolver expression evaluated by the executor (C8).

pub mod builtin;

use resourcex_util::errors::ResourceXError;
use serde_json::Value;
use std::collections::HashMap;

/// A registered resource type: `name`/`aliases` are lookup keys, `code` is
/// the resolver dispatched by the executor.
#[derive(Clone)]
pub struct TypeHandler {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: Option<String>,
    pub schema: Option<Value>,
    pub code: String,
}

/// Registers types by name and alias, rejecting collisions.
#[derive(Default)]
pub struct TypeRegistry {
    by_key: HashMap<String, TypeHandler>,
}

impl TypeRegistry {
    pub fn new() -> TypeRegistry {
        TypeRegistry::default()
    }

    /// The registry with the built-in types registered (`§4.7`).
    pub fn with_builtins() -> Result<TypeRegistry, ResourceXError> {
        let mut registry = TypeRegistry::new();
        for handler in builtin::builtin_types() {
            registry.register(handler)?;
        }
        Ok(registry)
    }

    /// Register a type, failing if its name or any alias collides with an
    /// already-registered key.
    pub fn register(&mut self, handler: TypeHandler) -> Result<(), ResourceXError> {
        let keys: Vec<&str> = std::iter::once(handler.name.as_str())
            .chain(handler.aliases.iter().map(String::as_str))
            .collect();
        for key in &keys {
            if self.by_key.contains_key(*key) {
                return Err(ResourceXError::ResourceType(format!(
                    "type key '{}' collides with an existing registration",
                    key
                )));
            }
        }
        for key in keys {
            self.by_key.insert(key.to_string(), handler.clone());
        }
        Ok(())
    }

    /// Resolve a manifest's `type` field, taking aliases into account.
    pub fn lookup(&self, type_name: &str) -> Result<&TypeHandler, ResourceXError> {
        self.by_key
            .get(type_name)
            .ok_or_else(|| ResourceXError::ResourceType(format!("unknown type '{}'", type_name)))
    }
}

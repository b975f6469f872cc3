//! Resolver executor (C8): dispatches a type's resolver against a resource's
//! files and caller-supplied arguments, in-process or via a sandbox.

use crate::manifest::Definition;
use crate::types::{builtin, TypeHandler};
use resourcex_util::errors::ResourceXError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a resolver sees: the manifest's definition fields and the resource's
/// packed files.
#[derive(Debug, Clone)]
pub struct ResolveContext {
    pub definition: Definition,
    pub files: BTreeMap<String, Vec<u8>>,
}

/// A resolver's result: most types yield JSON, `binary` yields raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Json(Value),
    Bytes(Vec<u8>),
}

/// The result of one sandboxed subprocess/container execution.
#[derive(Debug, Clone)]
pub struct SandboxOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// An external runner a resolver's `code` is shipped to in `sandboxed` mode.
/// Implementations own process/container lifecycle, timeouts, and resource
/// limits.
pub trait Sandbox: Send + Sync {
    fn execute(&self, script: &str, ctx: &ResolveContext, args: &Value) -> Result<SandboxOutput, ResourceXError>;
}

enum Mode {
    None,
    Sandboxed(Arc<dyn Sandbox>),
}

/// Dispatches resolvers: `none` evaluates built-in types in-process, `sandboxed`
/// hands `code` to an external [`Sandbox`]. `execute` is re-entrant: every
/// call is an independent evaluation, no memoisation.
pub struct Executor {
    mode: Mode,
    strict_args: bool,
}

impl Executor {
    /// In-process execution of trusted, built-in types.
    pub fn none() -> Executor {
        Executor {
            mode: Mode::None,
            strict_args: false,
        }
    }

    /// Sandboxed execution: `code` is handed to `sandbox` verbatim.
    pub fn sandboxed(sandbox: Arc<dyn Sandbox>) -> Executor {
        Executor {
            mode: Mode::Sandboxed(sandbox),
            strict_args: false,
        }
    }

    /// Opt into validating `args` against the type's `schema`, when present.
    pub fn with_strict_args(mut self, strict: bool) -> Executor {
        self.strict_args = strict;
        self
    }

    pub fn execute(
        &self,
        handler: &TypeHandler,
        ctx: &ResolveContext,
        args: &Value,
    ) -> Result<ResolvedValue, ResourceXError> {
        if self.strict_args {
            validate_args(handler, args)?;
        }
        match &self.mode {
            Mode::None => execute_native(&handler.code, ctx, args),
            Mode::Sandboxed(sandbox) => execute_sandboxed(sandbox.as_ref(), &handler.code, ctx, args),
        }
    }
}

fn validate_args(handler: &TypeHandler, args: &Value) -> Result<(), ResourceXError> {
    let schema = match &handler.schema {
        Some(schema) => schema,
        None => return Ok(()),
    };
    let compiled = jsonschema::JSONSchema::compile(schema)
        .map_err(|e| ResourceXError::ResourceType(format!("invalid schema for '{}': {}", handler.name, e)))?;
    if let Err(errors) = compiled.validate(args) {
        let detail: Vec<String> = errors.map(|e| e.to_string()).collect();
        return Err(ResourceXError::ResourceType(format!(
            "args for '{}' failed schema validation: {}",
            handler.name,
            detail.join("; ")
        )));
    }
    Ok(())
}

fn content_file<'a>(ctx: &'a ResolveContext) -> Result<&'a Vec<u8>, ResourceXError> {
    ctx.files
        .get("content")
        .ok_or_else(|| ResourceXError::Content("resource has no 'content' file".to_string()))
}

fn execute_native(code: &str, ctx: &ResolveContext, args: &Value) -> Result<ResolvedValue, ResourceXError> {
    match code {
        builtin::TEXT => {
            let text = String::from_utf8(content_file(ctx)?.clone())
                .map_err(|e| ResourceXError::Content(format!("content is not valid UTF-8: {}", e)))?;
            Ok(ResolvedValue::Json(Value::String(text)))
        }
        builtin::JSON => {
            let value: Value = serde_json::from_slice(content_file(ctx)?)
                .map_err(|e| ResourceXError::Content(format!("content is not valid JSON: {}", e)))?;
            Ok(ResolvedValue::Json(value))
        }
        builtin::BINARY => Ok(ResolvedValue::Bytes(content_file(ctx)?.clone())),
        builtin::SKILL => resolve_skill(ctx, args),
        builtin::PROTOTYPE => resolve_prototype(ctx),
        other => Err(ResourceXError::ResourceType(format!(
            "no native resolver registered for '{}'",
            other
        ))),
    }
}

fn resolve_skill(ctx: &ResolveContext, args: &Value) -> Result<ResolvedValue, ResourceXError> {
    let path = match args.get("reference").and_then(Value::as_str) {
        Some(reference) => format!("references/{}", reference),
        None => "SKILL.md".to_string(),
    };
    let bytes = ctx
        .files
        .get(&path)
        .ok_or_else(|| ResourceXError::Content(format!("file '{}' not found", path)))?;
    let text = String::from_utf8(bytes.clone())
        .map_err(|e| ResourceXError::Content(format!("'{}' is not valid UTF-8: {}", path, e)))?;
    Ok(ResolvedValue::Json(Value::String(text)))
}

fn resolve_prototype(ctx: &ResolveContext) -> Result<ResolvedValue, ResourceXError> {
    let root: Value = serde_json::from_slice(content_file(ctx)?)
        .map_err(|e| ResourceXError::Content(format!("content is not valid JSON: {}", e)))?;
    Ok(ResolvedValue::Json(inline_references(root, ctx)?))
}

fn inline_references(value: Value, ctx: &ResolveContext) -> Result<Value, ResourceXError> {
    match value {
        Value::String(s) => match s.strip_prefix('@') {
            Some(filename) => {
                let bytes = ctx
                    .files
                    .get(filename)
                    .ok_or_else(|| ResourceXError::Content(format!("referenced file '{}' not found", filename)))?;
                let text = String::from_utf8_lossy(bytes).into_owned();
                Ok(Value::String(text))
            }
            None => Ok(Value::String(s)),
        },
        Value::Array(items) => items
            .into_iter()
            .map(|item| inline_references(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .into_iter()
            .map(|(key, val)| inline_references(val, ctx).map(|val| (key, val)))
            .collect::<Result<serde_json::Map<_, _>, _>>()
            .map(Value::Object),
        other => Ok(other),
    }
}

fn execute_sandboxed(
    sandbox: &dyn Sandbox,
    script: &str,
    ctx: &ResolveContext,
    args: &Value,
) -> Result<ResolvedValue, ResourceXError> {
    let output = sandbox.execute(script, ctx, args)?;
    if output.exit_code != 0 {
        return Err(ResourceXError::ResourceType(format!(
            "sandbox execution exited with code {}: {}",
            output.exit_code, output.stderr
        )));
    }
    let value: Value = serde_json::from_str(&output.stdout)
        .map_err(|e| ResourceXError::ResourceType(format!("sandbox stdout is not valid JSON: {}", e)))?;
    Ok(ResolvedValue::Json(value))
}

//! Built-in resource types shipped with the engine (`§4.7`).

use crate::types::TypeHandler;

/// `text`/`txt`/`plaintext`: resolver returns UTF-8 of file `content`.
pub const TEXT: &str = "text";
/// `json`/`config`/`manifest`: resolver returns the JSON-parsed value of file `content`.
pub const JSON: &str = "json";
/// `binary`/`bin`/`blob`/`raw`: resolver returns raw bytes of file `content`.
pub const BINARY: &str = "binary";
/// `skill`: returns `SKILL.md`, or a named file from `references/` when `args.reference` is given.
pub const SKILL: &str = "skill";
/// `prototype`: returns a JSON object where `@filename` references are replaced by file contents.
pub const PROTOTYPE: &str = "prototype";

pub fn builtin_types() -> Vec<TypeHandler> {
    vec![
        TypeHandler {
            name: TEXT.to_string(),
            aliases: vec!["txt".to_string(), "plaintext".to_string()],
            description: Some("UTF-8 text content".to_string()),
            schema: None,
            code: TEXT.to_string(),
        },
        TypeHandler {
            name: JSON.to_string(),
            aliases: vec!["config".to_string(), "manifest".to_string()],
            description: Some("JSON-parsed content".to_string()),
            schema: None,
            code: JSON.to_string(),
        },
        TypeHandler {
            name: BINARY.to_string(),
            aliases: vec!["bin".to_string(), "blob".to_string(), "raw".to_string()],
            description: Some("raw bytes of content".to_string()),
            schema: None,
            code: BINARY.to_string(),
        },
        TypeHandler {
            name: SKILL.to_string(),
            aliases: vec![],
            description: Some("SKILL.md or a named reference file".to_string()),
            schema: Some(serde_json::json!({
                "type": "object",
                "properties": { "reference": { "type": "string" } },
                "additionalProperties": false
            })),
            code: SKILL.to_string(),
        },
        TypeHandler {
            name: PROTOTYPE.to_string(),
            aliases: vec![],
            description: Some("JSON object with @filename references inlined".to_string()),
            schema: None,
            code: PROTOTYPE.to_string(),
        },
    ]
}

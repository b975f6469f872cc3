//! The ResourceX error taxonomy.
//!
//! Every fallible operation in the engine, the client, and the registry
//! server returns a [`ResourceXError`]. The taxonomy is intentionally flat
//! (kinds, not a tree of causes) so that the HTTP layer and the CLI front-end
//! (out of scope here) can map a handful of cases to user-facing behaviour
//! without inspecting error internals.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

/// A structural or operational failure, tagged with one of the taxonomy's kinds.
#[derive(Debug, thiserror::Error)]
pub enum ResourceXError {
    /// Illegal characters, malformed digest, or empty name in a locator.
    #[error("invalid locator: {0}")]
    Locator(String),

    /// Missing required fields or an invalid type name in a manifest.
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// Tar/gzip corruption, a missing file in an archive, or an unsafe tar entry.
    #[error("invalid archive content: {0}")]
    Content(String),

    /// Resource not found locally and not pullable, a non-2xx remote response,
    /// or a digest mismatch.
    #[error("registry error ({kind}): {message}")]
    Registry {
        /// Fine-grained registry failure, e.g. "not-found" or "digest-mismatch".
        kind: &'static str,
        /// Human-readable detail.
        message: String,
    },

    /// Unknown type, duplicate registration, or a resolver runtime failure.
    #[error("resource type error: {0}")]
    ResourceType(String),

    /// An underlying I/O failure (filesystem or HTTP) that is not classified above.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl ResourceXError {
    /// Construct a digest-mismatch flavoured [`ResourceXError::Registry`].
    pub fn digest_mismatch(message: impl Into<String>) -> Self {
        ResourceXError::Registry {
            kind: "digest-mismatch",
            message: message.into(),
        }
    }

    /// Construct a not-found flavoured [`ResourceXError::Registry`].
    pub fn not_found(message: impl Into<String>) -> Self {
        ResourceXError::Registry {
            kind: "not-found",
            message: message.into(),
        }
    }

    /// Construct an upstream-fetch flavoured [`ResourceXError::Registry`].
    pub fn upstream(message: impl Into<String>) -> Self {
        ResourceXError::Registry {
            kind: "upstream",
            message: message.into(),
        }
    }

    /// Lowercase-snake-case kind name, stable across variants, used in the
    /// JSON error body and for log correlation.
    pub fn kind(&self) -> &str {
        match self {
            ResourceXError::Locator(_) => "locator_error",
            ResourceXError::Manifest(_) => "manifest_error",
            ResourceXError::Content(_) => "content_error",
            ResourceXError::Registry { kind, .. } => kind,
            ResourceXError::ResourceType(_) => "resource_type_error",
            ResourceXError::Transport(_) => "transport_error",
        }
    }

    /// HTTP status code the registry server maps this error to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ResourceXError::Locator(_) => StatusCode::BAD_REQUEST,
            ResourceXError::Manifest(_) => StatusCode::BAD_REQUEST,
            ResourceXError::Content(_) => StatusCode::BAD_REQUEST,
            ResourceXError::Registry { kind, .. } => match *kind {
                "not-found" => StatusCode::NOT_FOUND,
                "digest-mismatch" => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            },
            ResourceXError::ResourceType(_) => StatusCode::CONFLICT,
            ResourceXError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn as_json_error(&self) -> HttpResponse {
        #[derive(Serialize)]
        struct Body<'a> {
            error: &'a str,
            message: String,
        }
        HttpResponse::build(self.status_code()).json(Body {
            error: self.kind(),
            message: self.to_string(),
        })
    }
}

impl ResponseError for ResourceXError {
    fn error_response(&self) -> HttpResponse {
        self.as_json_error()
    }

    fn status_code(&self) -> StatusCode {
        ResourceXError::status_code(self)
    }
}

/// Convenience alias used throughout the ResourceX crates.
pub type Result<T> = std::result::Result<T, ResourceXError>;

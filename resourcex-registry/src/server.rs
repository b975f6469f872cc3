//! HTTP registry server (C10): a thin facade over [`crate::state::AppState`]'s
//! CAS, implementing the `/api/v1` surface from `§4.10`.

use crate::state::AppState;
use crate::status::Metrics;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, ResponseError};
use futures_util::{StreamExt, TryStreamExt};
use resourcex::archive::{digest_of_gzip_tar, Archive};
use resourcex::identifier::Identifier;
use resourcex::manifest::Manifest;
use resourcex_util::errors::ResourceXError;
use serde::{Deserialize, Serialize};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/v1/publish", web::post().to(publish))
        .route("/api/v1/resource/{locator:.*}", web::get().to(get_resource))
        .route("/api/v1/resource/{locator:.*}", web::head().to(head_resource))
        .route("/api/v1/resource/{locator:.*}", web::delete().to(delete_resource))
        .route("/api/v1/content/{locator:.*}", web::get().to(get_content))
        .route("/api/v1/search", web::get().to(search))
        .default_service(web::route().to(options_fallback));
}

#[derive(Serialize)]
struct PublishResponse {
    locator: String,
    digest: String,
}

#[derive(Serialize)]
struct ManifestResponse {
    #[serde(flatten)]
    manifest: Manifest,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

fn decode_locator(raw: &str) -> Result<String, ResourceXError> {
    percent_decode(raw).map_err(|e| ResourceXError::Locator(format!("malformed locator encoding: {}", e)))
}

fn percent_decode(s: &str) -> Result<String, std::string::FromUtf8Error> {
    let mut bytes = Vec::with_capacity(s.len());
    let mut chars = s.bytes();
    while let Some(b) = chars.next() {
        if b == b'%' {
            let hi = chars.next().unwrap_or(b'0');
            let lo = chars.next().unwrap_or(b'0');
            let hex = [hi, lo];
            let hex_str = std::str::from_utf8(&hex).unwrap_or("00");
            bytes.push(u8::from_str_radix(hex_str, 16).unwrap_or(b'?'));
        } else {
            bytes.push(b);
        }
    }
    String::from_utf8(bytes)
}

/// `POST /api/v1/publish`: multipart `locator`, `manifest`, `content`.
/// Serialises per-locator so a concurrent publish to the same tag can't
/// interleave blob and manifest writes.
async fn publish(state: web::Data<AppState>, metrics: web::Data<Metrics>, mut payload: Multipart) -> HttpResponse {
    let mut locator: Option<String> = None;
    let mut manifest_bytes: Option<Vec<u8>> = None;
    let mut content_bytes: Option<Vec<u8>> = None;

    while let Ok(Some(mut field)) = payload.try_next().await {
        let name = field.name().to_string();
        let mut buf = Vec::new();
        while let Some(chunk) = field.next().await {
            match chunk {
                Ok(bytes) => buf.extend_from_slice(&bytes),
                Err(e) => {
                    metrics.publish_total.with_label_values(&["error"]).inc();
                    return HttpResponse::BadRequest().body(format!("malformed multipart body: {}", e));
                }
            }
        }
        match name.as_str() {
            "locator" => locator = String::from_utf8(buf).ok(),
            "manifest" => manifest_bytes = Some(buf),
            "content" => content_bytes = Some(buf),
            _ => {}
        }
    }

    let result = (|| -> Result<PublishResponse, ResourceXError> {
        let locator = locator.ok_or_else(|| ResourceXError::Manifest("missing 'locator' field".to_string()))?;
        let manifest_bytes =
            manifest_bytes.ok_or_else(|| ResourceXError::Manifest("missing 'manifest' field".to_string()))?;
        let content_bytes =
            content_bytes.ok_or_else(|| ResourceXError::Content("missing 'content' field".to_string()))?;

        let mut manifest: Manifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| ResourceXError::Manifest(format!("invalid manifest JSON: {}", e)))?;

        let recomputed = digest_of_gzip_tar(&content_bytes)?;
        if let Some(declared) = &manifest.archive.digest {
            if declared != &recomputed {
                return Err(ResourceXError::digest_mismatch(format!(
                    "manifest declares {} but content digest is {}",
                    declared, recomputed
                )));
            }
        }
        manifest.archive.digest = Some(recomputed);

        let identifier = Identifier::parse(&locator)?;
        let archive = Archive::from_bytes(content_bytes)?;
        let resource = state.cas.put(&identifier, manifest, archive)?;

        Ok(PublishResponse {
            locator: resource.identifier.to_string(),
            digest: resource.manifest.archive.digest.clone().unwrap_or_default(),
        })
    })();

    match result {
        Ok(response) => {
            metrics.publish_total.with_label_values(&["ok"]).inc();
            HttpResponse::Created().json(response)
        }
        Err(e) => {
            metrics.publish_total.with_label_values(&["error"]).inc();
            e.error_response()
        }
    }
}

async fn get_resource(state: web::Data<AppState>, metrics: web::Data<Metrics>, path: web::Path<String>) -> HttpResponse {
    match resolve_identifier(&path) {
        Ok(identifier) => match state.cas.get(&identifier) {
            Ok(resource) => {
                metrics.fetch_total.with_label_values(&["ok"]).inc();
                HttpResponse::Ok().json(ManifestResponse { manifest: resource.manifest })
            }
            Err(e) => {
                metrics.fetch_total.with_label_values(&["error"]).inc();
                e.error_response()
            }
        },
        Err(e) => e.error_response(),
    }
}

async fn head_resource(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    match resolve_identifier(&path) {
        Ok(identifier) if state.cas.has(&identifier) => HttpResponse::Ok().finish(),
        _ => HttpResponse::NotFound().finish(),
    }
}

async fn get_content(state: web::Data<AppState>, metrics: web::Data<Metrics>, path: web::Path<String>) -> HttpResponse {
    match resolve_identifier(&path) {
        Ok(identifier) => match state.cas.get(&identifier) {
            Ok(resource) => {
                metrics.fetch_total.with_label_values(&["ok"]).inc();
                HttpResponse::Ok().content_type("application/gzip").body(resource.archive.bytes().to_vec())
            }
            Err(e) => {
                metrics.fetch_total.with_label_values(&["error"]).inc();
                e.error_response()
            }
        },
        Err(e) => e.error_response(),
    }
}

/// `DELETE /api/v1/resource/{locator}`: remove the tag entry; `204` on
/// success, matching the teacher's not-found-is-still-success deletion idiom.
async fn delete_resource(state: web::Data<AppState>, metrics: web::Data<Metrics>, path: web::Path<String>) -> HttpResponse {
    match resolve_identifier(&path) {
        Ok(identifier) => match state.cas.remove(&identifier) {
            Ok(()) => {
                metrics.delete_total.with_label_values(&["ok"]).inc();
                HttpResponse::NoContent().finish()
            }
            Err(e) => {
                metrics.delete_total.with_label_values(&["error"]).inc();
                e.error_response()
            }
        },
        Err(e) => e.error_response(),
    }
}

async fn search(state: web::Data<AppState>, metrics: web::Data<Metrics>, query: web::Query<SearchQuery>) -> HttpResponse {
    let locators: Vec<String> = state
        .cas
        .list(query.q.as_deref(), query.limit, query.offset)
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    metrics.search_total.with_label_values(&["ok"]).inc();
    HttpResponse::Ok().json(locators)
}

async fn options_fallback(req: actix_web::HttpRequest) -> HttpResponse {
    if req.method() == actix_web::http::Method::OPTIONS {
        HttpResponse::NoContent()
            .insert_header(("Access-Control-Allow-Origin", "*"))
            .insert_header(("Access-Control-Allow-Methods", "GET, POST, DELETE, HEAD, OPTIONS"))
            .insert_header(("Access-Control-Allow-Headers", "*"))
            .finish()
    } else {
        HttpResponse::NotFound().finish()
    }
}

fn resolve_identifier(encoded_locator: &str) -> Result<Identifier, ResourceXError> {
    let locator = decode_locator(encoded_locator)?;
    Identifier::parse(&locator)
}

//! End-to-end registry scenarios: a real `actix-web` server on an ephemeral
//! port, driven with `reqwest`, exercising the publish/fetch/delete/search
//! surface.

use actix_web::{middleware::Logger, web, App, HttpServer};
use resourcex::{Archive, Definition, DefinitionInput, Manifest};
use resourcex_registry::{server, status, AppState, Metrics};
use std::net::SocketAddr;

async fn spawn_server() -> (SocketAddr, tempfile::TempDir) {
    let data_dir = tempfile::tempdir().unwrap();
    let state = web::Data::new(AppState::new(data_dir.path().to_path_buf()).unwrap());
    let metrics = web::Data::new(Metrics::new().unwrap());

    let http_server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(metrics.clone())
            .wrap(Logger::default())
            .configure(server::configure)
            .route("/metrics", web::get().to(status::serve_metrics))
            .route("/livez", web::get().to(status::serve_livez))
            .route("/readyz", web::get().to(status::serve_readyz))
    })
    .bind(("127.0.0.1", 0))
    .unwrap();

    let addr = http_server.addrs()[0];
    let running = http_server.run();
    tokio::spawn(running);
    (addr, data_dir)
}

fn hello_manifest() -> Manifest {
    Manifest {
        definition: Definition::from_input(DefinitionInput {
            name: Some("hello".to_string()),
            type_name: Some("text".to_string()),
            tag: Some("1.0".to_string()),
            ..Default::default()
        })
        .unwrap(),
        ..Default::default()
    }
}

async fn publish(base: &str, locator: &str, manifest: &Manifest, content: &str) -> reqwest::Response {
    let archive = Archive::pack_content(content.as_bytes().to_vec()).unwrap();
    let form = reqwest::multipart::Form::new()
        .text("locator", locator.to_string())
        .text("manifest", serde_json::to_string(manifest).unwrap())
        .part("content", reqwest::multipart::Part::bytes(archive.bytes().to_vec()));

    reqwest::Client::new()
        .post(format!("{}/api/v1/publish", base))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn publish_then_fetch_resource_and_content() {
    let (addr, _guard) = spawn_server().await;
    let base = format!("http://{}", addr);

    let resp = publish(&base, "hello:1.0", &hello_manifest(), "Hello").await;
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["locator"], "hello:1.0");
    let digest = body["digest"].as_str().unwrap().to_string();

    let manifest_resp = reqwest::get(format!("{}/api/v1/resource/hello:1.0", base)).await.unwrap();
    assert_eq!(manifest_resp.status(), 200);
    let manifest: serde_json::Value = manifest_resp.json().await.unwrap();
    assert_eq!(manifest["archive"]["digest"], digest);

    let content_resp = reqwest::get(format!("{}/api/v1/content/hello:1.0", base)).await.unwrap();
    assert_eq!(content_resp.status(), 200);
    let bytes = content_resp.bytes().await.unwrap();
    let archive = Archive::from_bytes(bytes.to_vec()).unwrap();
    assert_eq!(archive.file("content").unwrap(), b"Hello");
}

#[tokio::test]
async fn publish_with_mismatched_digest_is_rejected() {
    let (addr, _guard) = spawn_server().await;
    let base = format!("http://{}", addr);

    let mut manifest = hello_manifest();
    manifest.archive.digest = Some(format!("sha256:{}", "0".repeat(64)));
    let resp = publish(&base, "hello:1.0", &manifest, "Hello").await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn head_and_delete_resource() {
    let (addr, _guard) = spawn_server().await;
    let base = format!("http://{}", addr);
    publish(&base, "hello:1.0", &hello_manifest(), "Hello").await;

    let client = reqwest::Client::new();
    let head = client.head(format!("{}/api/v1/resource/hello:1.0", base)).send().await.unwrap();
    assert_eq!(head.status(), 200);

    let delete = client.delete(format!("{}/api/v1/resource/hello:1.0", base)).send().await.unwrap();
    assert_eq!(delete.status(), 204);

    let head_again = client.head(format!("{}/api/v1/resource/hello:1.0", base)).send().await.unwrap();
    assert_eq!(head_again.status(), 404);
}

#[tokio::test]
async fn republish_moves_latest_to_new_digest() {
    let (addr, _guard) = spawn_server().await;
    let base = format!("http://{}", addr);

    publish(&base, "hello:1.0", &hello_manifest(), "Hello").await;
    let resp = publish(&base, "hello:1.0", &hello_manifest(), "Hi").await;
    assert_eq!(resp.status(), 201);

    let manifest_resp = reqwest::get(format!("{}/api/v1/resource/hello:1.0", base)).await.unwrap();
    let manifest: serde_json::Value = manifest_resp.json().await.unwrap();
    let content_resp = reqwest::get(format!("{}/api/v1/content/hello:1.0", base)).await.unwrap();
    let bytes = content_resp.bytes().await.unwrap();
    let archive = Archive::from_bytes(bytes.to_vec()).unwrap();
    assert_eq!(archive.digest(), manifest["archive"]["digest"].as_str().unwrap());
    assert_eq!(archive.file("content").unwrap(), b"Hi");
}

#[tokio::test]
async fn search_lists_published_locators() {
    let (addr, _guard) = spawn_server().await;
    let base = format!("http://{}", addr);
    publish(&base, "hello:1.0", &hello_manifest(), "Hello").await;

    let resp = reqwest::get(format!("{}/api/v1/search?q=hello", base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let locators: Vec<String> = resp.json().await.unwrap();
    assert!(locators.iter().any(|l| l.starts_with("hello:")));
}

#[tokio::test]
async fn metrics_and_health_endpoints_respond() {
    let (addr, _guard) = spawn_server().await;
    let base = format!("http://{}", addr);

    assert_eq!(reqwest::get(format!("{}/livez", base)).await.unwrap().status(), 200);
    assert_eq!(reqwest::get(format!("{}/readyz", base)).await.unwrap().status(), 200);

    publish(&base, "hello:1.0", &hello_manifest(), "Hello").await;
    let metrics_resp = reqwest::get(format!("{}/metrics", base)).await.unwrap();
    assert_eq!(metrics_resp.status(), 200);
    let body = metrics_resp.text().await.unwrap();
    assert!(body.contains("resourcex_registry_publish_total"));
}

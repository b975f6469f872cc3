//! The `Engine` facade (C9): `ingest`/`resolve`/`push`/`pull` over a local
//! CAS and a configured registry chain.

use crate::chain::{fetch_with_freshness, FreshnessOutcome, RegistryChain, RegistryEntry};
use crate::config::ClientConfig;
use crate::http::{HttpRegistryClient, RegistryApi};
use resourcex::archive::Archive;
use resourcex::exec::{Executor, ResolveContext, ResolvedValue};
use resourcex::identifier::Identifier;
use resourcex::manifest::{DefinitionInput, Manifest};
use resourcex::resource::Resource;
use resourcex::store::{FsBlobStore, FsManifestStore};
use resourcex::types::TypeRegistry;
use resourcex::CasRegistry;
use resourcex_util::errors::ResourceXError;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Owns its blob store, manifest store, and source loader chain (no
/// process-wide singleton, per the provider-injection design note).
pub struct Engine {
    cas: CasRegistry,
    loaders: resourcex::source::SourceLoaderChain,
    types: TypeRegistry,
    executor: Executor,
    chain: RegistryChain,
    clients: Mutex<HashMap<String, Arc<dyn RegistryApi>>>,
}

impl Engine {
    pub fn new(config: &ClientConfig) -> Result<Engine, ResourceXError> {
        let blobs = FsBlobStore::new(config.home.join("blobs"))?;
        let manifests = FsManifestStore::new(config.home.join("manifests"))?;
        let cas = CasRegistry::new(Arc::new(blobs), Arc::new(manifests));

        let entries = config
            .registries
            .iter()
            .map(|url| RegistryEntry {
                label: host_of(url).to_string(),
                api: Arc::new(HttpRegistryClient::new(url.clone())) as Arc<dyn RegistryApi>,
            })
            .collect();

        Ok(Engine {
            cas,
            loaders: resourcex::source::SourceLoaderChain::with_defaults(),
            types: TypeRegistry::with_builtins()?,
            executor: Executor::none(),
            chain: RegistryChain::new(entries),
            clients: Mutex::new(HashMap::new()),
        })
    }

    fn api_for_host(&self, host: &str) -> Arc<dyn RegistryApi> {
        let mut clients = self.clients.lock().unwrap();
        clients
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(HttpRegistryClient::new(base_url_for_host(host))) as Arc<dyn RegistryApi>)
            .clone()
    }

    /// `ingest(x)`: re-add `x` from source if the loader chain accepts it
    /// (the CAS deduplicates by digest, so this is a no-op on unchanged
    /// content); otherwise treat `x` as a locator and resolve it.
    pub async fn ingest(&self, x: &str) -> Result<Resource, ResourceXError> {
        let path = Path::new(x);
        if self.loaders.can_load(path) {
            let (manifest, archive) = self.loaders.load(path, &DefinitionInput::default())?;
            let identifier = identifier_from_definition(&manifest.definition);
            self.cas.put(&identifier, manifest, archive)
        } else {
            self.obtain_resource(x).await
        }
    }

    /// `resolve(locator, args)`: obtain the resource (local cache, freshness
    /// check, or registry chain), then dispatch it through the type-handler
    /// chain and execute it.
    pub async fn resolve(&self, locator: &str, args: Value) -> Result<ResolvedValue, ResourceXError> {
        let resource = self.obtain_resource(locator).await?;
        let handler = self.types.lookup(&resource.manifest.definition.type_name)?;
        let ctx = ResolveContext {
            definition: resource.manifest.definition.clone(),
            files: resource.archive.extract()?,
        };
        self.executor.execute(handler, &ctx, &args)
    }

    /// `push(locator, {registry})`: look up the resource locally and publish
    /// it to `registry`.
    pub async fn push(&self, locator: &str, registry: &str) -> Result<Manifest, ResourceXError> {
        let identifier = Identifier::parse(locator)?;
        let resource = self.cas.get(&identifier)?;
        self.api_for_host(host_of(registry))
            .publish(locator, &resource.manifest, resource.archive.bytes())
            .await
    }

    /// `pull(locator, {registry})`: fetch manifest and content from
    /// `registry` and `put` locally under a registry-qualified identifier.
    pub async fn pull(&self, locator: &str, registry: &str) -> Result<Resource, ResourceXError> {
        let identifier = Identifier::parse(locator)?;
        let api = self.api_for_host(host_of(registry));
        let mut manifest = api.fetch_manifest(locator).await?;
        let content = api.fetch_content(locator).await?;
        let archive = Archive::from_bytes(content)?;
        manifest.archive.digest = Some(archive.digest().to_string());

        let qualified = Identifier {
            registry: Some(host_of(registry).to_string()),
            ..identifier
        };
        self.cas.put(&qualified, manifest, archive)
    }

    /// `clearCache(registry?)`.
    pub fn clear_cache(&self, registry: Option<&str>) -> Result<(), ResourceXError> {
        self.cas.clear_cache(registry)
    }

    async fn obtain_resource(&self, locator: &str) -> Result<Resource, ResourceXError> {
        let identifier = Identifier::parse(locator)?;
        match &identifier.registry {
            Some(registry) => self.obtain_pinned(locator, &identifier, registry).await,
            None => self.obtain_via_chain(locator, &identifier).await,
        }
    }

    async fn obtain_pinned(
        &self,
        locator: &str,
        identifier: &Identifier,
        registry: &str,
    ) -> Result<Resource, ResourceXError> {
        if !self.cas.has(identifier) {
            return self.pull(locator, registry).await;
        }
        let api = self.api_for_host(registry);
        let cached = self.cas.get_stored_manifest(identifier).ok();
        match fetch_with_freshness(api.as_ref(), locator, cached.as_ref()).await {
            Ok(FreshnessOutcome::UpToDate(_)) => self.cas.get(identifier),
            Ok(FreshnessOutcome::Updated { manifest, content }) => {
                let archive = Archive::from_bytes(content)?;
                self.cas.put(identifier, manifest, archive)
            }
            // Network error: fall back to whatever is cached.
            Err(_) => self.cas.get(identifier),
        }
    }

    async fn obtain_via_chain(&self, locator: &str, identifier: &Identifier) -> Result<Resource, ResourceXError> {
        if self.cas.has(identifier) {
            return self.cas.get(identifier);
        }
        let (label, outcome) = self
            .chain
            .resolve(locator, |host| {
                let qualified = Identifier {
                    registry: Some(host.to_string()),
                    ..identifier.clone()
                };
                self.cas.get_stored_manifest(&qualified).ok()
            })
            .await?;
        let qualified = Identifier {
            registry: Some(label),
            ..identifier.clone()
        };
        match outcome {
            FreshnessOutcome::UpToDate(_) => self.cas.get(&qualified),
            FreshnessOutcome::Updated { manifest, content } => {
                let archive = Archive::from_bytes(content)?;
                self.cas.put(&qualified, manifest, archive)
            }
        }
    }
}

fn identifier_from_definition(def: &resourcex::manifest::Definition) -> Identifier {
    Identifier {
        registry: def.registry.clone(),
        path: def.path.clone(),
        name: def.name.clone(),
        tag: Some(def.tag.clone()),
        digest: None,
    }
}

/// Extract `host[:port]` from either a bare host string or a full URL.
fn host_of(registry: &str) -> &str {
    registry
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or(registry)
}

/// Reconstruct a base URL from a bare `host[:port]`, defaulting to `https`
/// except for loopback hosts used in local development and tests.
fn base_url_for_host(host: &str) -> String {
    if host.starts_with("localhost") || host.starts_with("127.0.0.1") {
        format!("http://{}", host)
    } else {
        format!("https://{}", host)
    }
}

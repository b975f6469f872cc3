//! Registry chain fallback and freshness checking (`§4.9`).

use crate::http::RegistryApi;
use resourcex::manifest::Manifest;
use resourcex_util::errors::ResourceXError;
use std::sync::Arc;

/// The outcome of a freshness-checked fetch against one registry.
pub enum FreshnessOutcome {
    /// The cached manifest's digest matched; no content re-download needed.
    UpToDate(Manifest),
    /// The remote digest differed (or there was nothing cached); the full
    /// manifest and content were fetched.
    Updated { manifest: Manifest, content: Vec<u8> },
}

/// Fetch-with-freshness against a single registry: a cheap manifest-only GET
/// first, content only pulled on a digest mismatch.
pub async fn fetch_with_freshness(
    api: &dyn RegistryApi,
    locator: &str,
    cached: Option<&Manifest>,
) -> Result<FreshnessOutcome, ResourceXError> {
    let remote_manifest = api.fetch_manifest(locator).await?;
    let fresh = match cached {
        Some(cached) => cached.archive.digest.is_some() && cached.archive.digest == remote_manifest.archive.digest,
        None => false,
    };
    if fresh {
        return Ok(FreshnessOutcome::UpToDate(remote_manifest));
    }
    let content = api.fetch_content(locator).await?;
    Ok(FreshnessOutcome::Updated {
        manifest: remote_manifest,
        content,
    })
}

/// One registry in the chain, labelled by the host string recorded in a
/// cached entry's identifier.
pub struct RegistryEntry {
    pub label: String,
    pub api: Arc<dyn RegistryApi>,
}

/// Configured registries tried in order, then (implicitly, by being last in
/// the list) the built-in default.
pub struct RegistryChain {
    entries: Vec<RegistryEntry>,
}

impl RegistryChain {
    pub fn new(entries: Vec<RegistryEntry>) -> RegistryChain {
        RegistryChain { entries }
    }

    /// Try each registry in order; the first that yields a successful fetch
    /// wins. A registry that errors (network failure, not-found) is skipped,
    /// not fatal, except the caller surfaces the last error if all fail.
    pub async fn resolve(
        &self,
        locator: &str,
        cached_by_registry: impl Fn(&str) -> Option<Manifest>,
    ) -> Result<(String, FreshnessOutcome), ResourceXError> {
        let mut last_error = ResourceXError::not_found(format!("'{}' not found in any registry", locator));
        for entry in &self.entries {
            let cached = cached_by_registry(&entry.label);
            match fetch_with_freshness(entry.api.as_ref(), locator, cached.as_ref()).await {
                Ok(outcome) => return Ok((entry.label.clone(), outcome)),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeApi {
        manifest: Manifest,
        content: Vec<u8>,
        fetch_calls: Mutex<usize>,
        content_calls: Mutex<usize>,
        fails: bool,
    }

    #[async_trait]
    impl RegistryApi for FakeApi {
        async fn fetch_manifest(&self, _locator: &str) -> Result<Manifest, ResourceXError> {
            *self.fetch_calls.lock().unwrap() += 1;
            if self.fails {
                return Err(ResourceXError::upstream("unreachable"));
            }
            Ok(self.manifest.clone())
        }
        async fn fetch_content(&self, _locator: &str) -> Result<Vec<u8>, ResourceXError> {
            *self.content_calls.lock().unwrap() += 1;
            Ok(self.content.clone())
        }
        async fn publish(&self, _: &str, _: &Manifest, _: &[u8]) -> Result<Manifest, ResourceXError> {
            unimplemented!()
        }
        async fn delete(&self, _: &str) -> Result<(), ResourceXError> {
            unimplemented!()
        }
        async fn search(&self, _: &str, _: Option<usize>, _: usize) -> Result<Vec<String>, ResourceXError> {
            unimplemented!()
        }
    }

    fn manifest_with_digest(digest: &str) -> Manifest {
        let mut m = Manifest::default();
        m.archive.digest = Some(digest.to_string());
        m
    }

    #[tokio::test]
    async fn matching_digest_skips_content_fetch() {
        let api = FakeApi {
            manifest: manifest_with_digest("sha256:aaa"),
            content: b"ignored".to_vec(),
            fetch_calls: Mutex::new(0),
            content_calls: Mutex::new(0),
            fails: false,
        };
        let cached = manifest_with_digest("sha256:aaa");
        let outcome = fetch_with_freshness(&api, "hello:1.0", Some(&cached)).await.unwrap();
        assert!(matches!(outcome, FreshnessOutcome::UpToDate(_)));
        assert_eq!(*api.content_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn digest_mismatch_triggers_content_fetch() {
        let api = FakeApi {
            manifest: manifest_with_digest("sha256:bbb"),
            content: b"hi".to_vec(),
            fetch_calls: Mutex::new(0),
            content_calls: Mutex::new(0),
            fails: false,
        };
        let cached = manifest_with_digest("sha256:aaa");
        let outcome = fetch_with_freshness(&api, "hello:1.0", Some(&cached)).await.unwrap();
        match outcome {
            FreshnessOutcome::Updated { content, .. } => assert_eq!(content, b"hi"),
            _ => panic!("expected Updated"),
        }
    }

    #[tokio::test]
    async fn chain_falls_through_unreachable_registry() {
        let unreachable = FakeApi {
            manifest: Manifest::default(),
            content: vec![],
            fetch_calls: Mutex::new(0),
            content_calls: Mutex::new(0),
            fails: true,
        };
        let reachable = FakeApi {
            manifest: manifest_with_digest("sha256:ccc"),
            content: b"x".to_vec(),
            fetch_calls: Mutex::new(0),
            content_calls: Mutex::new(0),
            fails: false,
        };
        let chain = RegistryChain::new(vec![
            RegistryEntry { label: "a".to_string(), api: Arc::new(unreachable) },
            RegistryEntry { label: "b".to_string(), api: Arc::new(reachable) },
        ]);
        let (label, outcome) = chain.resolve("x:1", |_| None).await.unwrap();
        assert_eq!(label, "b");
        assert!(matches!(outcome, FreshnessOutcome::Updated { .. }));
    }
}

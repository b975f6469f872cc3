// Copyright 2018 Alex Crawford
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The HTTP registry client: the concrete [`RegistryApi`] backing the
//! registry chain (`§4.9`), talking to the server described in `§4.10`.

use async_trait::async_trait;
use resourcex::manifest::Manifest;
use resourcex_util::errors::ResourceXError;

/// The subset of the registry HTTP protocol the chain needs. A trait so
/// chain/freshness logic can be tested against a fake without a live server.
#[async_trait]
pub trait RegistryApi: Send + Sync {
    async fn fetch_manifest(&self, locator: &str) -> Result<Manifest, ResourceXError>;
    async fn fetch_content(&self, locator: &str) -> Result<Vec<u8>, ResourceXError>;
    async fn publish(&self, locator: &str, manifest: &Manifest, content: &[u8]) -> Result<Manifest, ResourceXError>;
    async fn delete(&self, locator: &str) -> Result<(), ResourceXError>;
    async fn search(&self, query: &str, limit: Option<usize>, offset: usize) -> Result<Vec<String>, ResourceXError>;
}

/// A `reqwest`-backed [`RegistryApi`] against one registry base URL.
pub struct HttpRegistryClient {
    base_url: String,
    client: reqwest::Client,
    bearer_token: Option<String>,
}

/// Builds an [`HttpRegistryClient`], letting a caller supply its own
/// `reqwest::Client` (e.g. one with custom TLS settings or a connection
/// pool shared across registries) and an optional bearer token for
/// registries that require authentication.
#[derive(Default)]
pub struct HttpRegistryClientBuilder {
    base_url: String,
    client: Option<reqwest::Client>,
    bearer_token: Option<String>,
}

impl HttpRegistryClientBuilder {
    pub fn new(base_url: impl Into<String>) -> HttpRegistryClientBuilder {
        HttpRegistryClientBuilder {
            base_url: base_url.into(),
            client: None,
            bearer_token: None,
        }
    }

    pub fn client(mut self, client: reqwest::Client) -> HttpRegistryClientBuilder {
        self.client = Some(client);
        self
    }

    pub fn bearer_token(mut self, token: impl Into<String>) -> HttpRegistryClientBuilder {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn build(self) -> HttpRegistryClient {
        HttpRegistryClient {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            client: self.client.unwrap_or_default(),
            bearer_token: self.bearer_token,
        }
    }
}

impl HttpRegistryClient {
    pub fn new(base_url: impl Into<String>) -> HttpRegistryClient {
        HttpRegistryClientBuilder::new(base_url).build()
    }

    fn resource_url(&self, locator: &str) -> String {
        format!("{}/api/v1/resource/{}", self.base_url, urlencode(locator))
    }

    fn content_url(&self, locator: &str) -> String {
        format!("{}/api/v1/content/{}", self.base_url, urlencode(locator))
    }

    /// Attach the configured bearer token, if any, to an outgoing request.
    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn upstream_error(response: reqwest::Response) -> ResourceXError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND {
            ResourceXError::not_found(body)
        } else {
            ResourceXError::upstream(format!("{}: {}", status, body))
        }
    }
}

#[async_trait]
impl RegistryApi for HttpRegistryClient {
    async fn fetch_manifest(&self, locator: &str) -> Result<Manifest, ResourceXError> {
        let response = self
            .authorize(self.client.get(self.resource_url(locator)))
            .send()
            .await
            .map_err(|e| ResourceXError::upstream(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| ResourceXError::upstream(format!("malformed manifest response: {}", e)))
    }

    async fn fetch_content(&self, locator: &str) -> Result<Vec<u8>, ResourceXError> {
        let response = self
            .authorize(self.client.get(self.content_url(locator)))
            .send()
            .await
            .map_err(|e| ResourceXError::upstream(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await);
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ResourceXError::upstream(e.to_string()))
    }

    async fn publish(&self, locator: &str, manifest: &Manifest, content: &[u8]) -> Result<Manifest, ResourceXError> {
        let manifest_json = serde_json::to_vec(manifest)
            .map_err(|e| ResourceXError::Manifest(format!("failed to serialize manifest: {}", e)))?;
        let form = reqwest::multipart::Form::new()
            .text("locator", locator.to_string())
            .part("manifest", reqwest::multipart::Part::bytes(manifest_json).mime_str("application/json").unwrap())
            .part(
                "content",
                reqwest::multipart::Part::bytes(content.to_vec()).mime_str("application/gzip").unwrap(),
            );
        let response = self
            .authorize(self.client.post(format!("{}/api/v1/publish", self.base_url)))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ResourceXError::upstream(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| ResourceXError::upstream(format!("malformed publish response: {}", e)))
    }

    async fn delete(&self, locator: &str) -> Result<(), ResourceXError> {
        let response = self
            .authorize(self.client.delete(self.resource_url(locator)))
            .send()
            .await
            .map_err(|e| ResourceXError::upstream(e.to_string()))?;
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(Self::upstream_error(response).await);
        }
        Ok(())
    }

    async fn search(&self, query: &str, limit: Option<usize>, offset: usize) -> Result<Vec<String>, ResourceXError> {
        let mut url = reqwest::Url::parse(&format!("{}/api/v1/search", self.base_url))
            .map_err(|e| ResourceXError::upstream(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", query);
            if let Some(limit) = limit {
                pairs.append_pair("limit", &limit.to_string());
            }
            pairs.append_pair("offset", &offset.to_string());
        }
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| ResourceXError::upstream(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| ResourceXError::upstream(format!("malformed search response: {}", e)))
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_escapes_locator_separators() {
        assert_eq!(urlencode("team/hello:1.0"), "team%2Fhello%3A1.0");
    }

    #[test]
    fn base_url_trims_trailing_slash() {
        let client = HttpRegistryClient::new("http://localhost:8080/");
        assert_eq!(client.resource_url("hello"), "http://localhost:8080/api/v1/resource/hello");
    }
}

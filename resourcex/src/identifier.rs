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

//! Locator grammar: `[registry/][path/]name[:tag][@digest]`.

use resourcex_util::errors::ResourceXError;
use std::fmt;

const DEFAULT_TAG: &str = "latest";

/// A parsed Docker-style locator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identifier {
    /// Optional `host[:port]`, e.g. `registry.example.com` or `localhost:5000`.
    pub registry: Option<String>,
    /// Optional `/`-separated path segments, e.g. `team/tools`.
    pub path: Option<String>,
    /// Required resource name.
    pub name: String,
    /// Optional tag; defaults to `latest` at resolve time, not at parse time.
    pub tag: Option<String>,
    /// Optional `sha256:<hex64>` pin.
    pub digest: Option<String>,
}

impl Identifier {
    /// Return the tag, substituting `latest` if unset.
    pub fn tag_or_default(&self) -> &str {
        self.tag.as_deref().unwrap_or(DEFAULT_TAG)
    }

    /// Return a copy of this identifier with the tag cleared, used as the key
    /// for the `latest` pointer (`§4.4`).
    pub fn without_tag(&self) -> Identifier {
        Identifier {
            tag: None,
            ..self.clone()
        }
    }

    /// Parse a locator string.
    pub fn parse(s: &str) -> Result<Identifier, ResourceXError> {
        if s.is_empty() {
            return Err(ResourceXError::Locator("empty locator".to_string()));
        }

        // Peel off the digest on the last '@'.
        let (rest, digest) = match s.rfind('@') {
            Some(idx) => {
                let digest = &s[idx + 1..];
                validate_digest(digest)?;
                (&s[..idx], Some(digest.to_string()))
            }
            None => (s, None),
        };
        if rest.is_empty() {
            return Err(ResourceXError::Locator("empty locator".to_string()));
        }

        // Peel off the tag on the last ':'.
        let (rest, tag) = match rest.rfind(':') {
            Some(idx) => {
                let tag = &rest[idx + 1..];
                validate_tag(tag)?;
                (&rest[..idx], Some(tag.to_string()))
            }
            None => (rest, None),
        };
        if rest.is_empty() {
            return Err(ResourceXError::Locator("empty locator".to_string()));
        }

        // Split the remainder on '/' into registry?/path?/name.
        let segments: Vec<&str> = rest.split('/').collect();
        let (registry, path, name) = match segments.as_slice() {
            [name] => (None, None, *name),
            [first, rest_segments @ ..] if looks_like_registry(first) => {
                match rest_segments {
                    [] => return Err(ResourceXError::Locator("empty name".to_string())),
                    [name] => (Some(*first), None, *name),
                    _ => {
                        let (name, path_segments) = rest_segments.split_last().unwrap();
                        (Some(*first), Some(path_segments.join("/")), *name)
                    }
                }
            }
            _ => {
                let (name, path_segments) = segments.split_last().unwrap();
                (None, Some(path_segments.join("/")), *name)
            }
        };

        validate_name(name)?;

        Ok(Identifier {
            registry: registry.map(str::to_string),
            path: path.filter(|p| !p.is_empty()),
            name: name.to_string(),
            tag,
            digest,
        })
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{}/", registry)?;
        }
        if let Some(path) = &self.path {
            write!(f, "{}/", path)?;
        }
        write!(f, "{}", self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// Format an identifier back into its canonical locator string.
pub fn format(id: &Identifier) -> String {
    id.to_string()
}

fn looks_like_registry(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

fn validate_name(name: &str) -> Result<(), ResourceXError> {
    if name.is_empty() {
        return Err(ResourceXError::Locator("empty name".to_string()));
    }
    if name.len() > 255 {
        return Err(ResourceXError::Locator(
            "name exceeds 255 bytes".to_string(),
        ));
    }
    if name.contains('/') || name.contains(':') || name.contains('@') {
        return Err(ResourceXError::Locator(format!(
            "illegal characters in name '{}'",
            name
        )));
    }
    Ok(())
}

fn validate_tag(tag: &str) -> Result<(), ResourceXError> {
    if tag.contains(':') || tag.contains('@') {
        return Err(ResourceXError::Locator(format!(
            "illegal characters in tag '{}'",
            tag
        )));
    }
    Ok(())
}

fn validate_digest(digest: &str) -> Result<(), ResourceXError> {
    let hex = digest
        .strip_prefix("sha256:")
        .ok_or_else(|| ResourceXError::Locator(format!("malformed digest '{}'", digest)))?;
    if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ResourceXError::Locator(format!(
            "malformed digest '{}'",
            digest
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(
        registry: Option<&str>,
        path: Option<&str>,
        name: &str,
        tag: Option<&str>,
        digest: Option<&str>,
    ) -> Identifier {
        Identifier {
            registry: registry.map(String::from),
            path: path.map(String::from),
            name: name.to_string(),
            tag: tag.map(String::from),
            digest: digest.map(String::from),
        }
    }

    #[test]
    fn parse_bare_name() {
        assert_eq!(Identifier::parse("hello").unwrap(), id(None, None, "hello", None, None));
    }

    #[test]
    fn parse_name_and_tag() {
        assert_eq!(
            Identifier::parse("hello:1.0").unwrap(),
            id(None, None, "hello", Some("1.0"), None)
        );
    }

    #[test]
    fn parse_path_and_name() {
        assert_eq!(
            Identifier::parse("team/tools/hello").unwrap(),
            id(None, Some("team/tools"), "hello", None, None)
        );
    }

    #[test]
    fn parse_registry_with_dot() {
        assert_eq!(
            Identifier::parse("registry.example.com/hello:1.0").unwrap(),
            id(Some("registry.example.com"), None, "hello", Some("1.0"), None)
        );
    }

    #[test]
    fn parse_registry_with_port_and_path() {
        assert_eq!(
            Identifier::parse("localhost:5000/team/hello:1.0").unwrap(),
            id(
                Some("localhost:5000"),
                Some("team"),
                "hello",
                Some("1.0"),
                None
            )
        );
    }

    #[test]
    fn parse_with_digest() {
        let digest = format!("sha256:{}", "a".repeat(64));
        let parsed = Identifier::parse(&format!("hello:1.0@{}", digest)).unwrap();
        assert_eq!(parsed.digest.as_deref(), Some(digest.as_str()));
        assert_eq!(parsed.tag.as_deref(), Some("1.0"));
        assert_eq!(parsed.name, "hello");
    }

    #[test]
    fn first_segment_without_dot_or_colon_is_path() {
        assert_eq!(
            Identifier::parse("team/hello").unwrap(),
            id(None, Some("team"), "hello", None, None)
        );
    }

    #[test]
    fn malformed_digest_rejected() {
        assert!(Identifier::parse("hello@sha256:zz").is_err());
        assert!(Identifier::parse("hello@md5:abcd").is_err());
    }

    #[test]
    fn empty_name_rejected() {
        assert!(Identifier::parse("").is_err());
        assert!(Identifier::parse(":1.0").is_err());
    }

    #[test]
    fn roundtrip_parse_format() {
        let digest = format!("sha256:{}", "b".repeat(64));
        for s in [
            "hello",
            "hello:1.0",
            "team/tools/hello:1.0",
            "registry.example.com/team/hello:1.0",
            "localhost:5000/hello",
            &format!("hello:1.0@{}", digest),
        ] {
            let parsed = Identifier::parse(s).unwrap();
            assert_eq!(format(&parsed), s, "roundtrip failed for {}", s);
        }
    }

    #[test]
    fn without_tag_clears_only_tag() {
        let parsed = Identifier::parse("hello:1.0").unwrap();
        let stripped = parsed.without_tag();
        assert_eq!(stripped.tag, None);
        assert_eq!(stripped.name, "hello");
    }
}

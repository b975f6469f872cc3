//! Client configuration: the three-layer merge described in the ambient
//! stack notes, specialised to the client's `home`/`registries` settings.

use resourcex_util::assign_if_some;
use resourcex_util::config::{env_with_fallback, MergeOptions};
use resourcex_util::errors::{ResourceXError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// The built-in registry consulted after every configured registry in the
/// chain has been tried.
pub const BUILTIN_DEFAULT_REGISTRY: &str = "https://registry.resourcex.local";

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub home: PathBuf,
    pub registries: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            home: default_home(),
            registries: vec![BUILTIN_DEFAULT_REGISTRY.to_string()],
        }
    }
}

fn default_home() -> PathBuf {
    dirs_home().unwrap_or_else(|| PathBuf::from(".")).join(".resourcex")
}

fn dirs_home() -> Option<PathBuf> {
    env_with_fallback("HOME", "USERPROFILE").map(PathBuf::from)
}

/// A single layer of configuration input; any field left `None`/empty
/// leaves the narrower layer's value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfigInput {
    #[serde(default)]
    pub home: Option<PathBuf>,
    #[serde(default)]
    pub registries: Vec<String>,
}

impl MergeOptions<ClientConfigInput> for ClientConfig {
    fn try_merge(&mut self, options: ClientConfigInput) -> Result<()> {
        assign_if_some!(self.home, options.home);
        if !options.registries.is_empty() {
            self.registries = options.registries;
        }
        Ok(())
    }
}

impl ClientConfig {
    /// Layer built-in defaults, then `config.json` (if present), then an
    /// explicit constructor argument, then environment variables.
    pub fn load(config_json_path: Option<&Path>, explicit: ClientConfigInput) -> Result<ClientConfig> {
        let mut config = ClientConfig::default();

        if let Some(path) = config_json_path {
            if let Some(from_file) = read_config_json(path)? {
                config.try_merge(from_file)?;
            }
        }

        config.try_merge(explicit)?;

        if let Some(home) = env_with_fallback("RESOURCEX_HOME", "RX_HOME") {
            config.home = PathBuf::from(home);
        }
        if let Some(registry) = env_with_fallback("RESOURCEX_REGISTRY", "RX_REGISTRY") {
            config.registries = vec![registry];
        }

        Ok(config)
    }
}

fn read_config_json(path: &Path) -> Result<Option<ClientConfigInput>> {
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(path).map_err(ResourceXError::Transport)?;
    let input = serde_json::from_slice(&bytes)
        .map_err(|e| ResourceXError::Manifest(format!("invalid config.json: {}", e)))?;
    Ok(Some(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn explicit_argument_overrides_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("RESOURCEX_HOME");
        std::env::remove_var("RX_HOME");
        std::env::remove_var("RESOURCEX_REGISTRY");
        std::env::remove_var("RX_REGISTRY");

        let config = ClientConfig::load(
            None,
            ClientConfigInput {
                home: Some(PathBuf::from("/tmp/custom-home")),
                registries: vec![],
            },
        )
        .unwrap();
        assert_eq!(config.home, PathBuf::from("/tmp/custom-home"));
    }

    #[test]
    fn env_var_wins_over_explicit_argument() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("RESOURCEX_HOME", "/tmp/env-home");

        let config = ClientConfig::load(
            None,
            ClientConfigInput {
                home: Some(PathBuf::from("/tmp/custom-home")),
                registries: vec![],
            },
        )
        .unwrap();
        assert_eq!(config.home, PathBuf::from("/tmp/env-home"));

        std::env::remove_var("RESOURCEX_HOME");
    }

    #[test]
    fn config_json_layers_under_explicit_argument() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("RESOURCEX_REGISTRY");
        std::env::remove_var("RX_REGISTRY");

        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        fs::write(&config_path, r#"{"registries": ["http://from-file"]}"#).unwrap();

        let config = ClientConfig::load(Some(&config_path), ClientConfigInput::default()).unwrap();
        assert_eq!(config.registries, vec!["http://from-file".to_string()]);
    }

    #[test]
    fn fallback_env_name_is_honoured() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("RESOURCEX_REGISTRY");
        std::env::set_var("RX_REGISTRY", "http://fallback-name");

        let config = ClientConfig::load(None, ClientConfigInput::default()).unwrap();
        assert_eq!(config.registries, vec!["http://fallback-name".to_string()]);

        std::env::remove_var("RX_REGISTRY");
    }
}

//! Server configuration: address/port and the CAS data root, merged through
//! the same three-layer pattern as the client (`§10`).

use resourcex_util::assign_if_some;
use resourcex_util::config::{env_with_fallback, MergeOptions};
use resourcex_util::errors::{ResourceXError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub data_root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: "127.0.0.1".to_string(),
            port: 8080,
            data_root: PathBuf::from("./resourcex-data"),
        }
    }
}

/// A single configuration layer; unset fields leave the narrower layer's
/// value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigInput {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub data_root: Option<PathBuf>,
}

impl MergeOptions<ServerConfigInput> for ServerConfig {
    fn try_merge(&mut self, options: ServerConfigInput) -> Result<()> {
        assign_if_some!(self.address, options.address);
        assign_if_some!(self.port, options.port);
        assign_if_some!(self.data_root, options.data_root);
        Ok(())
    }
}

impl ServerConfig {
    /// Layer built-in defaults, then `config.json` (if present), then an
    /// explicit constructor argument, then environment variables.
    pub fn load(config_json_path: Option<&Path>, explicit: ServerConfigInput) -> Result<ServerConfig> {
        let mut config = ServerConfig::default();

        if let Some(path) = config_json_path {
            if let Some(from_file) = read_config_json(path)? {
                config.try_merge(from_file)?;
            }
        }

        config.try_merge(explicit)?;

        if let Some(home) = env_with_fallback("RESOURCEX_HOME", "RX_HOME") {
            config.data_root = PathBuf::from(home);
        }
        if let Some(port) = env_with_fallback("RESOURCEX_PORT", "RX_PORT") {
            config.port = port
                .parse()
                .map_err(|_| ResourceXError::Manifest(format!("invalid port '{}'", port)))?;
        }

        Ok(config)
    }
}

fn read_config_json(path: &Path) -> Result<Option<ServerConfigInput>> {
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
    fn explicit_argument_overrides_default_port() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("RESOURCEX_PORT");
        std::env::remove_var("RX_PORT");

        let config = ServerConfig::load(
            None,
            ServerConfigInput {
                port: Some(9999),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(config.port, 9999);
    }

    #[test]
    fn env_var_wins_over_explicit_port() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("RESOURCEX_PORT", "7777");

        let config = ServerConfig::load(
            None,
            ServerConfigInput {
                port: Some(9999),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(config.port, 7777);

        std::env::remove_var("RESOURCEX_PORT");
    }
}

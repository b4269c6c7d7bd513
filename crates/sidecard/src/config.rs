//! Configuration management for sidecard.
//!
//! Tunables come from an optional TOML file; the GameServer identity always
//! comes from the environment the orchestrator injects into the pod.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sidecar_common::SidecarError;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/thundernetes/sidecar.toml";

/// Environment variable overriding `CONFIG_PATH`
pub const CONFIG_PATH_ENV: &str = "SIDECAR_CONFIG";

pub const GAMESERVER_NAME_ENV: &str = "PF_GAMESERVER_NAME";
pub const GAMESERVER_NAMESPACE_ENV: &str = "PF_GAMESERVER_NAMESPACE";

/// Port the game SDKs expect the sidecar on.
pub const SIDECAR_PORT: u16 = 56001;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarConfig {
    /// Address the heartbeat endpoint binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Upper bound for every cluster API call, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Explicit API server URL (e.g. a `kubectl proxy`). When unset the
    /// in-cluster service account configuration is used.
    #[serde(default)]
    pub api_server: Option<String>,

    /// Mirror connected players into the GameServerDetail resource
    #[serde(default)]
    pub sync_connected_players: bool,

    /// Dump every heartbeat at debug level
    #[serde(default)]
    pub log_every_heartbeat: bool,

    /// Maximum accepted heartbeat body size
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_listen_addr() -> String {
    format!("0.0.0.0:{}", SIDECAR_PORT)
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            request_timeout_ms: default_request_timeout_ms(),
            api_server: None,
            sync_connected_players: false,
            log_every_heartbeat: false,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl SidecarConfig {
    /// Load config from `$SIDECAR_CONFIG` or `CONFIG_PATH`, falling back to
    /// defaults when no file is present.
    pub fn load() -> Self {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| CONFIG_PATH.to_string());
        Self::load_or_default(&path)
    }

    pub fn load_or_default(path: &str) -> Self {
        if !Path::new(path).exists() {
            info!("No config at {}, using defaults", path);
            return Self::default();
        }
        Self::load_from_path(path).unwrap_or_else(|e| {
            warn!("Config at {} unreadable, using defaults: {}", path, e);
            Self::default()
        })
    }

    /// Load config from specific path
    pub fn load_from_path(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: SidecarConfig = toml::from_str(&content)?;
        info!("Loaded config from {}", path);
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Which GameServer resource this sidecar reports for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameServerIdentity {
    pub name: String,
    pub namespace: String,
}

impl GameServerIdentity {
    pub fn from_env() -> Result<Self, SidecarError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SidecarError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| SidecarError::Config(format!("{} not defined", key)))
        };
        Ok(Self {
            name: required(GAMESERVER_NAME_ENV)?,
            namespace: required(GAMESERVER_NAMESPACE_ENV)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SidecarConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:56001");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert!(config.api_server.is_none());
        assert!(!config.sync_connected_players);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
request_timeout_ms = 1500
sync_connected_players = true
api_server = "http://127.0.0.1:8001"
"#;
        let config: SidecarConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.request_timeout_ms, 1500);
        assert!(config.sync_connected_players);
        assert_eq!(config.api_server.as_deref(), Some("http://127.0.0.1:8001"));
        // Defaults for missing fields
        assert_eq!(config.listen_addr, "0.0.0.0:56001");
        assert_eq!(config.max_body_bytes, 64 * 1024);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = SidecarConfig::load_or_default(path.to_str().unwrap());
        assert_eq!(config.request_timeout_ms, 5_000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen_addr = \"127.0.0.1:9000\"").unwrap();
        writeln!(file, "log_every_heartbeat = true").unwrap();
        let config = SidecarConfig::load_or_default(file.path().to_str().unwrap());
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert!(config.log_every_heartbeat);
    }

    #[test]
    fn test_identity_requires_both_variables() {
        let env: HashMap<&str, &str> = [(GAMESERVER_NAME_ENV, "gs-1")].into_iter().collect();
        let err = GameServerIdentity::from_lookup(|k| env.get(k).map(|v| v.to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(GAMESERVER_NAMESPACE_ENV));

        let env: HashMap<&str, &str> = [
            (GAMESERVER_NAME_ENV, "gs-1"),
            (GAMESERVER_NAMESPACE_ENV, "games"),
        ]
        .into_iter()
        .collect();
        let identity =
            GameServerIdentity::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(identity.name, "gs-1");
        assert_eq!(identity.namespace, "games");
    }
}

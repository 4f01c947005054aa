//! Server configuration.
//!
//! Layered as defaults, then a TOML file, then environment variables; `main` applies CLI
//! flags last.

use crate::error::ConfigError;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use synapse_orchestrator::OrchestratorConfig;
use synapse_training::loader::DEFAULT_PROBE_TABLES;
use synapse_training::{
    BuiltinResolver, DatasetLoader, DatasetResolver, LocalFileResolver, RemoteStoreConfig,
    RemoteStoreResolver,
};

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "synapse.toml";

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpConfig,
    #[serde(default)]
    pub datasets: DatasetsConfig,
    #[serde(default)]
    pub remote_store: Option<RemoteStoreSection>,
    #[serde(default)]
    pub training: TrainingSection,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HttpConfig {
    #[serde(default = "default_address")]
    pub address: SocketAddr,
    /// Origins allowed by CORS.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_address() -> SocketAddr {
    // This is a compile-time constant, so expect is safe
    "0.0.0.0:8000".parse().expect("valid default address")
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string(), "http://localhost:3001".to_string()]
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { address: default_address(), allowed_origins: default_allowed_origins() }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DatasetsConfig {
    /// Directory searched for `<dataset_id>.csv`.
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,
    /// Serve the built-in reference datasets.
    #[serde(default = "default_true")]
    pub builtin: bool,
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("./datasets")
}

fn default_true() -> bool {
    true
}

impl Default for DatasetsConfig {
    fn default() -> Self {
        Self { local_dir: default_local_dir(), builtin: true }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RemoteStoreSection {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_probe_tables")]
    pub probe_tables: Vec<String>,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_probe_tables() -> Vec<String> {
    DEFAULT_PROBE_TABLES.iter().map(ToString::to_string).collect()
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct TrainingSection {
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_max_concurrent_sessions() -> usize {
    OrchestratorConfig::default().max_concurrent_sessions
}

fn default_event_buffer() -> usize {
    OrchestratorConfig::default().event_buffer
}

impl Default for TrainingSection {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: default_max_concurrent_sessions(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads `path`, or `./synapse.toml` when present, or falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    return Ok(Self::default());
                }
                fallback
            }
        };
        let content = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        Self::from_toml_str(&content)
    }

    /// Applies `SYNAPSE_*` variables, with the `SUPABASE_*` names accepted for the store.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k).filter(|v| !v.is_empty()));

        if let Some(address) = first(&["SYNAPSE_ADDRESS"]) {
            self.server.address = address
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("SYNAPSE_ADDRESS: {address}")))?;
        }

        let url = first(&["SYNAPSE_REMOTE_URL", "SUPABASE_URL"]);
        let key = first(&["SYNAPSE_REMOTE_KEY", "SUPABASE_KEY"]);
        if let Some(remote) = self.remote_store.as_mut() {
            if let Some(url) = url {
                remote.url = url;
            }
            if let Some(key) = key {
                remote.api_key = key;
            }
        } else if let (Some(url), Some(api_key)) = (url, key) {
            self.remote_store = Some(RemoteStoreSection {
                url,
                api_key,
                timeout_secs: default_timeout_secs(),
                probe_tables: default_probe_tables(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrent_sessions: self.training.max_concurrent_sessions,
            event_buffer: self.training.event_buffer,
        }
    }

    #[must_use]
    pub fn remote_store_config(&self) -> Option<RemoteStoreConfig> {
        self.remote_store.as_ref().map(|remote| {
            RemoteStoreConfig::new(remote.url.clone(), remote.api_key.clone())
                .with_timeout(Duration::from_secs(remote.timeout_secs))
                .with_probe_tables(remote.probe_tables.clone())
        })
    }

    /// Dataset tiers in resolution order: remote store, built-ins, local files.
    #[must_use]
    pub fn dataset_loader(&self) -> DatasetLoader {
        let mut resolvers: Vec<Box<dyn DatasetResolver>> = Vec::new();
        if let Some(remote) = self.remote_store_config() {
            resolvers.push(Box::new(RemoteStoreResolver::new(remote)));
        }
        if self.datasets.builtin {
            resolvers.push(Box::new(BuiltinResolver));
        }
        resolvers.push(Box::new(LocalFileResolver::new(self.datasets.local_dir.clone())));
        DatasetLoader::new(resolvers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.server.address, "0.0.0.0:8000".parse().unwrap());
        assert_eq!(config.server.allowed_origins.len(), 2);
        assert_eq!(config.training.max_concurrent_sessions, 4);
        assert_eq!(config.training.event_buffer, 64);
        assert!(config.remote_store.is_none());
        assert_eq!(config.dataset_loader().tier_names(), vec!["builtin", "local"]);
    }

    #[test]
    fn test_parse_full_file() {
        let config = ServerConfig::from_toml_str(
            r#"
            [server]
            address = "127.0.0.1:9000"
            allowed_origins = ["https://app.example.com"]

            [datasets]
            local_dir = "/srv/datasets"
            builtin = false

            [remote_store]
            url = "https://store.example.com"
            api_key = "secret"
            probe_tables = ["iris"]

            [training]
            max_concurrent_sessions = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.server.address, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.datasets.local_dir, PathBuf::from("/srv/datasets"));
        let remote = config.remote_store.as_ref().unwrap();
        assert_eq!(remote.timeout_secs, 10);
        assert_eq!(remote.probe_tables, vec!["iris".to_string()]);
        assert_eq!(config.training.event_buffer, 64);
        assert_eq!(config.orchestrator_config().max_concurrent_sessions, 2);
        assert_eq!(config.dataset_loader().tier_names(), vec!["remote", "local"]);
    }

    #[test]
    fn test_malformed_file_is_rejected() {
        let err = ServerConfig::from_toml_str("[server]\naddress = 12").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_reads_explicit_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("synapse.toml");
        std::fs::write(&path, "[training]\nevent_buffer = 8\n").unwrap();

        let config = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.training.event_buffer, 8);

        let missing = ServerConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_env_configures_remote_store_and_address() {
        let env: HashMap<&str, &str> = [
            ("SUPABASE_URL", "https://legacy.example.com"),
            ("SYNAPSE_REMOTE_URL", "https://store.example.com"),
            ("SUPABASE_KEY", "legacy-key"),
            ("SYNAPSE_ADDRESS", "127.0.0.1:7000"),
        ]
        .into_iter()
        .collect();

        let mut config = ServerConfig::default();
        config.apply_env_from(|k| env.get(k).map(ToString::to_string)).unwrap();

        let remote = config.remote_store.unwrap();
        assert_eq!(remote.url, "https://store.example.com");
        assert_eq!(remote.api_key, "legacy-key");
        assert_eq!(config.server.address, "127.0.0.1:7000".parse().unwrap());
    }

    #[test]
    fn test_env_needs_both_url_and_key() {
        let mut config = ServerConfig::default();
        config
            .apply_env_from(|k| (k == "SYNAPSE_REMOTE_URL").then(|| "https://x".to_string()))
            .unwrap();
        assert!(config.remote_store.is_none());

        let err = config
            .apply_env_from(|k| (k == "SYNAPSE_ADDRESS").then(|| "not an address".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}

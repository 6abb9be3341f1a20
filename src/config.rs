//! Runtime configuration.

use crate::proxy::{DirectProxy, Proxy, RelayProxy};
use crate::store::{JsonFileStore, MemoryStore, Store};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable overriding `proxy.relay_url` (and switching to relay mode).
pub const RELAY_URL_ENV: &str = "API_CHAIN_RELAY_URL";

/// Environment variable overriding `store.path`.
pub const STORE_PATH_ENV: &str = "API_CHAIN_STORE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    #[default]
    Direct,
    Relay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub mode: ProxyMode,
    #[serde(default)]
    pub relay_url: Option<String>,
    /// Base for relative endpoints in direct mode
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            mode: ProxyMode::Direct,
            relay_url: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_true")]
    pub honor_wait_time: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            honor_wait_time: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON file holding definitions and workflows; in-memory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Parse a YAML configuration document.
    pub fn parse(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse config YAML")
    }

    /// Load a YAML configuration file and apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(RELAY_URL_ENV) {
            if !url.is_empty() {
                self.proxy.mode = ProxyMode::Relay;
                self.proxy.relay_url = Some(url);
            }
        }

        if let Ok(path) = std::env::var(STORE_PATH_ENV) {
            if !path.is_empty() {
                self.store.path = Some(PathBuf::from(path));
            }
        }
    }

    /// Build the proxy collaborator described by this config.
    pub fn build_proxy(&self) -> Result<Arc<dyn Proxy>> {
        let timeout = Duration::from_secs(self.proxy.timeout_secs);
        let connect_timeout = Duration::from_secs(self.proxy.connect_timeout_secs);

        match self.proxy.mode {
            ProxyMode::Direct => {
                let mut proxy = DirectProxy::new(timeout, connect_timeout)?;
                if let Some(base) = self.proxy.base_url.as_deref().filter(|u| !u.is_empty()) {
                    proxy = proxy
                        .with_base_url(base)
                        .with_context(|| format!("Invalid proxy.base_url: {}", base))?;
                }
                Ok(Arc::new(proxy))
            }
            ProxyMode::Relay => {
                let url = self
                    .proxy
                    .relay_url
                    .as_deref()
                    .filter(|u| !u.is_empty())
                    .context("Relay proxy mode requires proxy.relay_url")?;
                Ok(Arc::new(RelayProxy::new(url, timeout, connect_timeout)?))
            }
        }
    }

    /// Open the configured store.
    pub fn open_store(&self) -> Result<Arc<dyn Store>> {
        match self.store.path {
            Some(ref path) => {
                let store = JsonFileStore::open(path)
                    .with_context(|| format!("Failed to open store: {}", path.display()))?;
                Ok(Arc::new(store))
            }
            None => Ok(Arc::new(MemoryStore::new())),
        }
    }
}

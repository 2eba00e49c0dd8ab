//! Federation configuration.
//!
//! Loaded from an optional YAML file, then overridden by environment
//! variables:
//!
//! - `FEDERATED_ADMIN_AUTH`: admin credential required for mutations
//! - `BIND_ADDR`: HTTP listen address (or `PORT` for `0.0.0.0:{PORT}`)
//! - `FETCH_TIMEOUT_MS`: per-endpoint capability fetch timeout
//! - `MAX_CONCURRENT_FETCHES`: parallel fetches per refresh
//! - `REGISTRY_PATH`: JSON file persisting the endpoint registry
//! - `TYPE_REGISTRY_PATH`: YAML type registry for function applicability

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FederationError, Result};
use crate::registry::Endpoint;

pub const ADMIN_AUTH_ENV: &str = "FEDERATED_ADMIN_AUTH";

/// Configuration passed to the federation at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Admin credential; absence is an operator error
    #[serde(default)]
    pub admin_auth: Option<String>,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Persist the registry here; in-memory only when unset
    #[serde(default)]
    pub registry_path: Option<PathBuf>,

    #[serde(default)]
    pub type_registry_path: Option<PathBuf>,

    /// Endpoints registered at startup
    #[serde(default)]
    pub initial_endpoints: Vec<Endpoint>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_max_concurrent_fetches() -> usize {
    16
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            admin_auth: None,
            bind_addr: default_bind_addr(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            registry_path: None,
            type_registry_path: None,
            initial_endpoints: Vec::new(),
        }
    }
}

impl FederationConfig {
    /// Defaults with `admin_auth` set.
    pub fn with_admin_auth(admin_auth: impl Into<String>) -> Self {
        Self {
            admin_auth: Some(admin_auth.into()),
            ..Self::default()
        }
    }

    /// Parse from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Defaults overridden by the environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from environment variables that are set.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(auth) = var(ADMIN_AUTH_ENV) {
            self.admin_auth = Some(auth);
        }
        if let Some(addr) = var("BIND_ADDR") {
            self.bind_addr = addr;
        } else if let Some(port) = var("PORT") {
            self.bind_addr = format!("0.0.0.0:{}", port);
        }
        if let Some(ms) = var("FETCH_TIMEOUT_MS") {
            self.fetch_timeout_ms = parse_number("FETCH_TIMEOUT_MS", &ms)?;
        }
        if let Some(n) = var("MAX_CONCURRENT_FETCHES") {
            self.max_concurrent_fetches = parse_number("MAX_CONCURRENT_FETCHES", &n)?;
        }
        if let Some(path) = var("REGISTRY_PATH") {
            self.registry_path = Some(PathBuf::from(path));
        }
        if let Some(path) = var("TYPE_REGISTRY_PATH") {
            self.type_registry_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Check the configuration can enforce the authorization contract and
    /// drive refreshes.
    pub fn validate(&self) -> Result<()> {
        match self.admin_auth.as_deref().map(str::trim) {
            Some(auth) if !auth.is_empty() => {}
            _ => return Err(FederationError::MisconfiguredAuthorization),
        }
        if self.fetch_timeout_ms == 0 {
            return Err(FederationError::Config(
                "fetch_timeout_ms must be positive".to_string(),
            ));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(FederationError::Config(
                "max_concurrent_fetches must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| FederationError::Config(format!("{} is not a number: {}", key, value)))
}

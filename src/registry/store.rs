//! Registry persistence.
//!
//! The registry itself is an in-memory structure; a `RegistryStore` lets it
//! survive restarts. The registry loads from the store once on construction
//! and saves the full endpoint list after every mutation.

use std::path::{Path, PathBuf};

use super::endpoint::Endpoint;
use crate::error::{FederationError, Result};

/// Backing store for the endpoint registry.
pub trait RegistryStore: Send + Sync {
    /// Load the persisted endpoints in registry order.
    fn load(&self) -> Result<Vec<Endpoint>>;

    /// Replace the persisted endpoints with `endpoints`.
    fn save(&self, endpoints: &[Endpoint]) -> Result<()>;
}

/// Stores the registry as a JSON array of `{"name", "url"}` objects.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegistryStore for JsonFileStore {
    fn load(&self) -> Result<Vec<Endpoint>> {
        if !self.path.exists() {
            log::info!(
                "Registry file {} does not exist yet, starting empty",
                self.path.display()
            );
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let endpoints: Vec<Endpoint> = serde_json::from_str(&content)?;
        log::info!(
            "Loaded {} endpoint(s) from {}",
            endpoints.len(),
            self.path.display()
        );
        Ok(endpoints)
    }

    fn save(&self, endpoints: &[Endpoint]) -> Result<()> {
        let json = serde_json::to_string_pretty(endpoints)?;

        // Write-then-rename so a crash never leaves a truncated registry.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| {
            FederationError::Persistence(format!("{}: {}", tmp.display(), e))
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            FederationError::Persistence(format!("{}: {}", self.path.display(), e))
        })?;

        log::debug!(
            "Saved {} endpoint(s) to {}",
            endpoints.len(),
            self.path.display()
        );
        Ok(())
    }
}

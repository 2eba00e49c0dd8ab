//! # Endpoint Registry
//!
//! Mapping of logical name → endpoint address. Both the name and the address
//! are unique across the registry, and iteration order is insertion order.
//!
//! The registry performs no refresh on its own: callers (the configuration
//! service) decide when a mutation should trigger one.
//!
//! Mutations are serialized by a registry-level write lock, so concurrent
//! `add` calls can never both pass the uniqueness checks for the same name
//! or address.

pub mod endpoint;
pub mod store;

use std::sync::Arc;

use parking_lot::RwLock;

pub use endpoint::Endpoint;
pub use store::{JsonFileStore, RegistryStore};

use crate::error::{FederationError, Result};

/// The endpoint registry.
#[derive(Default)]
pub struct EndpointRegistry {
    /// Endpoints in insertion order
    endpoints: RwLock<Vec<Endpoint>>,

    /// Optional persistence
    store: Option<Arc<dyn RegistryStore>>,
}

impl std::fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("endpoints", &*self.endpoints.read())
            .field("store", &self.store.as_ref().map(|_| "<store>"))
            .finish()
    }
}

impl EndpointRegistry {
    /// Create an empty, non-persistent registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry backed by `store`, loading its current contents.
    ///
    /// A persisted file that violates the uniqueness invariants is rejected
    /// rather than silently repaired.
    pub fn with_store(store: Arc<dyn RegistryStore>) -> Result<Self> {
        let loaded = store.load()?;

        let mut endpoints: Vec<Endpoint> = Vec::with_capacity(loaded.len());
        for endpoint in loaded {
            check_unique(&endpoints, &endpoint.name, &endpoint.address)?;
            endpoints.push(endpoint);
        }

        Ok(Self {
            endpoints: RwLock::new(endpoints),
            store: Some(store),
        })
    }

    /// Register a new endpoint.
    ///
    /// Fails with `DuplicateName` if the name is taken, otherwise with
    /// `DuplicateAddress` if the address is taken under any name. The
    /// registry is unchanged on failure.
    ///
    /// With a store attached the save runs synchronously under the write
    /// lock; async callers should invoke this from the blocking pool.
    pub fn add(&self, name: &str, address: &str) -> Result<Endpoint> {
        let mut endpoints = self.endpoints.write();
        check_unique(&endpoints, name, address)?;

        let endpoint = Endpoint::new(name, address);
        endpoints.push(endpoint.clone());

        if let Err(e) = self.persist(&endpoints) {
            endpoints.pop();
            return Err(e);
        }

        tracing::info!(name = %name, address = %address, "Added endpoint");
        Ok(endpoint)
    }

    /// Remove an endpoint by name, returning its address if it was present.
    pub fn remove(&self, name: &str) -> Result<Option<String>> {
        let mut endpoints = self.endpoints.write();
        let Some(index) = endpoints.iter().position(|e| e.name == name) else {
            return Ok(None);
        };

        let removed = endpoints.remove(index);
        if let Err(e) = self.persist(&endpoints) {
            endpoints.insert(index, removed);
            return Err(e);
        }

        tracing::info!(name = %removed.name, address = %removed.address, "Removed endpoint");
        Ok(Some(removed.address))
    }

    /// Current contents in insertion order.
    pub fn snapshot(&self) -> Vec<Endpoint> {
        self.endpoints.read().clone()
    }

    /// Look up an endpoint by name.
    pub fn get(&self, name: &str) -> Option<Endpoint> {
        self.endpoints.read().iter().find(|e| e.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    fn persist(&self, endpoints: &[Endpoint]) -> Result<()> {
        match &self.store {
            Some(store) => store.save(endpoints),
            None => Ok(()),
        }
    }
}

fn check_unique(endpoints: &[Endpoint], name: &str, address: &str) -> Result<()> {
    if endpoints.iter().any(|e| e.name == name) {
        return Err(FederationError::DuplicateName(name.to_string()));
    }
    if endpoints.iter().any(|e| e.address == address) {
        return Err(FederationError::DuplicateAddress(address.to_string()));
    }
    Ok(())
}

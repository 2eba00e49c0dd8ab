//! # Configuration Service
//!
//! The boundary clients talk to. Mutations are gated by the [`Authorizer`]
//! and followed by a coordinator refresh; reads are ungated and answer from
//! the registry (endpoint listing) or the published snapshot (everything
//! else), never from the network.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::capabilities::{EndpointStatus, FederatedSnapshot, Schema, StoreTrait};
use crate::config::FederationConfig;
use crate::coordinator::FederationCoordinator;
use crate::error::{FederationError, Result};
use crate::fetcher::{CapabilityFetcher, CapabilitySource};
use crate::policy::{AdminCredentialAuthorizer, Authorizer, Caller};
use crate::registry::{Endpoint, EndpointRegistry, JsonFileStore};
use crate::resolver::{TypeRegistry, TypeResolver};

pub struct ConfigurationService {
    coordinator: Arc<FederationCoordinator>,
    authorizer: Arc<dyn Authorizer>,
    resolver: Arc<dyn TypeResolver>,
}

impl std::fmt::Debug for ConfigurationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationService")
            .field("coordinator", &self.coordinator)
            .field("authorizer", &"<authorizer>")
            .field("resolver", &"<resolver>")
            .finish()
    }
}

impl ConfigurationService {
    pub fn new(
        coordinator: Arc<FederationCoordinator>,
        authorizer: Arc<dyn Authorizer>,
        resolver: Arc<dyn TypeResolver>,
    ) -> Self {
        Self {
            coordinator,
            authorizer,
            resolver,
        }
    }

    /// Build the whole federation from configuration: registry (persistent
    /// when `registry_path` is set), fetcher over `source`, coordinator,
    /// admin-credential authorizer and type registry. Seed endpoints are
    /// registered and one refresh is run before returning.
    ///
    /// Fails with `MisconfiguredAuthorization` when no admin credential is
    /// configured.
    pub async fn from_config(
        config: &FederationConfig,
        source: Arc<dyn CapabilitySource>,
    ) -> Result<Self> {
        config.validate()?;
        let authorizer = AdminCredentialAuthorizer::new(config.admin_auth.as_deref())?;

        let registry = match &config.registry_path {
            Some(path) => EndpointRegistry::with_store(Arc::new(JsonFileStore::new(path)))?,
            None => EndpointRegistry::new(),
        };
        let registry = Arc::new(registry);

        for seed in &config.initial_endpoints {
            match registry.add(&seed.name, &seed.address) {
                Ok(_) => {}
                // Already present from the persisted registry
                Err(FederationError::DuplicateName(_))
                | Err(FederationError::DuplicateAddress(_)) => {
                    tracing::debug!(endpoint = %seed, "Seed endpoint already registered");
                }
                Err(e) => return Err(e),
            }
        }

        let resolver = match &config.type_registry_path {
            Some(path) => TypeRegistry::from_yaml_file(path)?,
            None => TypeRegistry::new(),
        };

        let fetcher = CapabilityFetcher::new(
            source,
            config.fetch_timeout(),
            config.max_concurrent_fetches,
        );
        let coordinator = Arc::new(FederationCoordinator::new(registry, fetcher));

        let service = Self::new(coordinator, Arc::new(authorizer), Arc::new(resolver));
        service.refresh().await;
        Ok(service)
    }

    pub fn coordinator(&self) -> &Arc<FederationCoordinator> {
        &self.coordinator
    }

    fn registry(&self) -> &EndpointRegistry {
        self.coordinator.registry()
    }

    fn authorize(&self, caller: &Caller, action: &str) -> Result<()> {
        if self.authorizer.authorize(caller) {
            Ok(())
        } else {
            tracing::warn!(user = %caller.user_id, action, "Unauthorized configuration change");
            Err(FederationError::Unauthorized(format!(
                "user '{}' may not {}",
                caller.user_id, action
            )))
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Register an endpoint and refresh.
    pub async fn add_endpoint(
        &self,
        caller: &Caller,
        name: &str,
        address: &str,
    ) -> Result<Endpoint> {
        self.authorize(caller, "add endpoints")?;

        let registry = self.coordinator.registry().clone();
        let (name, address) = (name.to_string(), address.to_string());
        let endpoint = run_blocking(move || registry.add(&name, &address)).await?;

        self.coordinator.refresh().await;
        Ok(endpoint)
    }

    /// Remove an endpoint by name; refreshes only if something was removed.
    pub async fn remove_endpoint(&self, caller: &Caller, name: &str) -> Result<bool> {
        self.authorize(caller, "remove endpoints")?;

        let registry = self.coordinator.registry().clone();
        let name = name.to_string();
        let removed = run_blocking(move || registry.remove(&name)).await?.is_some();
        if removed {
            self.coordinator.refresh().await;
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Registered endpoints, including ones no refresh has seen yet.
    pub fn list_endpoints(&self) -> BTreeSet<Endpoint> {
        self.registry().snapshot().into_iter().collect()
    }

    /// Look up one registered endpoint.
    pub fn get_endpoint(&self, name: &str) -> Result<Endpoint> {
        self.registry()
            .get(name)
            .ok_or_else(|| FederationError::NotFound(name.to_string()))
    }

    /// Run a refresh and return its statuses.
    pub async fn refresh(&self) -> Vec<EndpointStatus> {
        self.coordinator.refresh().await
    }

    /// Statuses from the last completed refresh.
    pub fn status(&self) -> Vec<EndpointStatus> {
        self.coordinator.current().statuses.clone()
    }

    pub fn snapshot(&self) -> Arc<FederatedSnapshot> {
        self.coordinator.current()
    }

    pub fn get_schema(&self) -> Schema {
        self.snapshot().capabilities.schema.clone()
    }

    pub fn get_operations(&self) -> BTreeSet<String> {
        self.snapshot().capabilities.operations.clone()
    }

    pub fn get_traits(&self) -> BTreeSet<StoreTrait> {
        self.snapshot().capabilities.traits.clone()
    }

    pub fn get_filter_functions(&self) -> BTreeSet<String> {
        self.snapshot().capabilities.filter_functions.clone()
    }

    pub fn get_transform_functions(&self) -> BTreeSet<String> {
        self.snapshot().capabilities.transform_functions.clone()
    }

    pub fn get_generators(&self) -> BTreeSet<String> {
        self.snapshot().capabilities.generators.clone()
    }

    pub fn is_operation_supported(&self, operation: &str) -> bool {
        self.snapshot().capabilities.operations.contains(operation)
    }

    /// Filter functions whose single declared input accepts `input_type`.
    ///
    /// A blank `input_type` returns every filter function. Functions whose
    /// applicability cannot be determined are included.
    pub fn get_filter_functions_applicable_to(&self, input_type: &str) -> Result<BTreeSet<String>> {
        let input_type = input_type.trim();
        if input_type.is_empty() {
            return Ok(self.get_filter_functions());
        }

        let descriptor = self
            .resolver
            .type_descriptor(input_type)
            .ok_or_else(|| FederationError::UnknownType(input_type.to_string()))?;

        Ok(self
            .snapshot()
            .capabilities
            .filter_functions
            .iter()
            .filter(|function| {
                self.resolver
                    .accepts_single_input(function, &descriptor)
                    .unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    /// Names of the fields serialised for `type_name`.
    pub fn get_serialised_fields(&self, type_name: &str) -> Result<BTreeSet<String>> {
        self.resolver
            .type_descriptor(type_name.trim())
            .map(|descriptor| descriptor.fields)
            .ok_or_else(|| FederationError::UnknownType(type_name.to_string()))
    }
}

/// Registry mutations write the persisted file under the registry lock, so
/// they run on the blocking pool.
async fn run_blocking<T, F>(mutation: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(mutation)
        .await
        .map_err(|e| FederationError::Persistence(format!("registry task failed: {}", e)))?
}

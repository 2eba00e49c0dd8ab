//! # graph-federation
//!
//! Presents a set of independently operated graph endpoints as one logical
//! graph. Endpoints are registered by name and address; each refresh fetches
//! every endpoint's capabilities concurrently, merges the reachable ones and
//! atomically publishes the result. Reads answer from the last published
//! snapshot and never touch the network.
//!
//! ```text
//! ConfigurationService ──gate──▶ EndpointRegistry
//!          │                           │ snapshot
//!          ▼                           ▼
//!  FederationCoordinator ──▶ CapabilityFetcher ──▶ CapabilitySource (HTTP)
//!          │
//!          └─ merge() ──▶ Arc<FederatedSnapshot>
//! ```

pub mod capabilities;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod policy;
pub mod registry;
pub mod resolver;
pub mod server;
pub mod service;

pub use capabilities::{CapabilitySnapshot, EndpointStatus, FederatedSnapshot, Schema, StoreTrait};
pub use config::FederationConfig;
pub use coordinator::FederationCoordinator;
pub use error::{FederationError, Result};
pub use fetcher::{CapabilityFetcher, CapabilitySource, FetchError};
pub use policy::{AdminCredentialAuthorizer, Authorizer, Caller};
pub use registry::{Endpoint, EndpointRegistry};
pub use resolver::{TypeRegistry, TypeResolver};
pub use service::ConfigurationService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

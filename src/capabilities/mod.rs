//! # Capabilities
//!
//! What a graph endpoint supports, and how those descriptions combine.
//!
//! ## Flow
//!
//! ```text
//! CapabilitySource::fetch(endpoint)   one CapabilitySnapshot per endpoint
//!   ▼
//! merge([(name, snapshot), ...])     unions, trait intersection, schema merge
//!   ▼
//! FederatedSnapshot                   published by the coordinator
//! ```
//!
//! Per-endpoint snapshots are ephemeral: they are produced by the fetcher,
//! consumed by the merge and dropped. Only the federated snapshot is kept.

pub mod merge;
pub mod snapshot;

pub use merge::{merge, GroupKind, MergeOutcome, SchemaConflict};
pub use snapshot::{
    CapabilitySnapshot, ElementDefinition, EndpointStatus, FederatedSnapshot, Schema, StoreTrait,
};

//! Capability data model: schema, per-endpoint snapshots and the federated
//! snapshot published by the coordinator.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::merge::SchemaConflict;
use crate::fetcher::FetchErrorKind;
use crate::registry::Endpoint;

/// A named structural or behavioural guarantee a store claims to support.
///
/// Trait identifiers are endpoint-defined; the well-known ones are provided
/// as constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreTrait(pub String);

impl StoreTrait {
    pub const AGGREGATION: &'static str = "AGGREGATION";
    pub const PRE_AGGREGATION_FILTERING: &'static str = "PRE_AGGREGATION_FILTERING";
    pub const POST_AGGREGATION_FILTERING: &'static str = "POST_AGGREGATION_FILTERING";
    pub const TRANSFORMATION: &'static str = "TRANSFORMATION";
    pub const POST_TRANSFORMATION_FILTERING: &'static str = "POST_TRANSFORMATION_FILTERING";
    pub const STORE_VALIDATION: &'static str = "STORE_VALIDATION";
    pub const ORDERED: &'static str = "ORDERED";
    pub const VISIBILITY: &'static str = "VISIBILITY";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreTrait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoreTrait {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Definition of one entity or edge group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinition {
    /// Vertex type (entities)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertex: Option<String>,

    /// Source vertex type (edges)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Destination vertex type (edges)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Directedness type (edges)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directed: Option<String>,

    /// Property name → property type
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// Properties elements are grouped by during aggregation
    #[serde(default)]
    pub group_by: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ElementDefinition {
    /// Entity definition keyed on `vertex`.
    pub fn entity(vertex: impl Into<String>) -> Self {
        Self {
            vertex: Some(vertex.into()),
            ..Self::default()
        }
    }

    /// Edge definition between `source` and `destination`.
    pub fn edge(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            destination: Some(destination.into()),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.properties.insert(name.into(), type_name.into());
        self
    }
}

/// Schema description of a graph: entity and edge groups by name.
///
/// Entities and edges are separate namespaces; a group name may appear in
/// both.
///
/// A merged schema also remembers the groups it dropped as conflicting, so
/// that merging it again (or federating a federation) keeps them dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(default)]
    pub entities: BTreeMap<String, ElementDefinition>,

    #[serde(default)]
    pub edges: BTreeMap<String, ElementDefinition>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub conflicted_entities: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub conflicted_edges: BTreeSet<String>,
}

impl Schema {
    /// No usable groups. Conflict markers alone do not count.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.edges.is_empty()
    }

    /// All group names, entities first.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.entities
            .keys()
            .chain(self.edges.keys())
            .map(|g| g.as_str())
    }
}

/// Capabilities retrieved from a single endpoint at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySnapshot {
    #[serde(default)]
    pub schema: Schema,

    #[serde(default)]
    pub operations: BTreeSet<String>,

    #[serde(default)]
    pub filter_functions: BTreeSet<String>,

    #[serde(default)]
    pub transform_functions: BTreeSet<String>,

    #[serde(default)]
    pub generators: BTreeSet<String>,

    #[serde(default)]
    pub traits: BTreeSet<StoreTrait>,
}

impl CapabilitySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operations<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operations.extend(operations.into_iter().map(Into::into));
        self
    }

    pub fn with_filter_functions<I, S>(mut self, functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter_functions
            .extend(functions.into_iter().map(Into::into));
        self
    }

    pub fn with_transform_functions<I, S>(mut self, functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transform_functions
            .extend(functions.into_iter().map(Into::into));
        self
    }

    pub fn with_generators<I, S>(mut self, generators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.generators.extend(generators.into_iter().map(Into::into));
        self
    }

    pub fn with_traits<I, S>(mut self, traits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.traits
            .extend(traits.into_iter().map(|t| StoreTrait(t.into())));
        self
    }

    pub fn with_entity(mut self, group: impl Into<String>, definition: ElementDefinition) -> Self {
        self.schema.entities.insert(group.into(), definition);
        self
    }

    pub fn with_edge(mut self, group: impl Into<String>, definition: ElementDefinition) -> Self {
        self.schema.edges.insert(group.into(), definition);
        self
    }
}

/// Health of one endpoint as observed by one refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointStatus {
    pub endpoint: Endpoint,

    pub reachable: bool,

    /// Failure description when the endpoint was excluded from the merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, rename = "errorKind", skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FetchErrorKind>,

    /// Time taken to fetch capabilities
    #[serde(
        default,
        rename = "latencyMs",
        with = "duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub latency: Option<Duration>,
}

/// The merged, published view across all reachable endpoints.
///
/// Immutable once published: the coordinator replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedSnapshot {
    /// Refresh generation; 0 is the empty startup snapshot
    pub generation: u64,

    pub published_at: DateTime<Utc>,

    #[serde(flatten)]
    pub capabilities: CapabilitySnapshot,

    /// One entry per registered endpoint, in registry order
    pub statuses: Vec<EndpointStatus>,

    /// Schema groups dropped from this generation's merge
    #[serde(default)]
    pub conflicts: Vec<SchemaConflict>,
}

impl FederatedSnapshot {
    /// The startup snapshot: empty schema, empty sets, no statuses.
    pub fn empty() -> Self {
        Self {
            generation: 0,
            published_at: Utc::now(),
            capabilities: CapabilitySnapshot::default(),
            statuses: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn reachable_count(&self) -> usize {
        self.statuses.iter().filter(|s| s.reachable).count()
    }
}

impl Default for FederatedSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

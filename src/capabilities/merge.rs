//! Capability merger: folds per-endpoint snapshots into one federated view.
//!
//! Rules:
//! - operations, filter functions, transform functions, generators: union
//! - traits: intersection (a trait is federation-wide only if every
//!   contributing endpoint supports it); zero contributions yield no traits
//! - schema: groups combined by name; a group whose definitions disagree on
//!   a property type or on an identifier type is dropped, remembered in the
//!   schema's conflicted set and reported as a [`SchemaConflict`]
//!
//! The merged snapshot is commutative and associative: any order or
//! grouping of the same contributions gives the same snapshot. Conflicted
//! markers are what keep a re-merge of a partial result from bringing a
//! dropped group back. Reported endpoint lists follow contribution order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::snapshot::{CapabilitySnapshot, ElementDefinition, Schema, StoreTrait};

/// Which schema namespace a group belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Entity,
    Edge,
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity => f.write_str("entity"),
            Self::Edge => f.write_str("edge"),
        }
    }
}

/// A schema group whose definitions could not be reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConflict {
    pub group: String,
    pub kind: GroupKind,
    /// Every endpoint that declared the group, in contribution order
    pub endpoints: Vec<String>,
    pub reason: String,
}

impl fmt::Display for SchemaConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} group '{}' conflicts across [{}]: {}",
            self.kind,
            self.group,
            self.endpoints.join(", "),
            self.reason
        )
    }
}

/// Result of a merge: the merged capabilities plus any dropped groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub snapshot: CapabilitySnapshot,
    pub conflicts: Vec<SchemaConflict>,
}

/// Merge successful per-endpoint snapshots, each tagged with its endpoint
/// name.
pub fn merge<'a, I>(contributions: I) -> MergeOutcome
where
    I: IntoIterator<Item = (&'a str, &'a CapabilitySnapshot)>,
{
    let contributions: Vec<(&str, &CapabilitySnapshot)> = contributions.into_iter().collect();

    let mut merged = CapabilitySnapshot::default();
    let mut traits: Option<BTreeSet<StoreTrait>> = None;

    for (_, snapshot) in &contributions {
        merged.operations.extend(snapshot.operations.iter().cloned());
        merged
            .filter_functions
            .extend(snapshot.filter_functions.iter().cloned());
        merged
            .transform_functions
            .extend(snapshot.transform_functions.iter().cloned());
        merged.generators.extend(snapshot.generators.iter().cloned());

        traits = Some(match traits {
            None => snapshot.traits.clone(),
            Some(acc) => acc.intersection(&snapshot.traits).cloned().collect(),
        });
    }
    merged.traits = traits.unwrap_or_default();

    let mut conflicts = Vec::new();
    let (entities, conflicted_entities) = merge_groups(
        GroupKind::Entity,
        contributions
            .iter()
            .map(|(name, s)| (*name, &s.schema.entities, &s.schema.conflicted_entities)),
        &mut conflicts,
    );
    let (edges, conflicted_edges) = merge_groups(
        GroupKind::Edge,
        contributions
            .iter()
            .map(|(name, s)| (*name, &s.schema.edges, &s.schema.conflicted_edges)),
        &mut conflicts,
    );
    merged.schema = Schema {
        entities,
        edges,
        conflicted_entities,
        conflicted_edges,
    };

    MergeOutcome {
        snapshot: merged,
        conflicts,
    }
}

type Groups = BTreeMap<String, ElementDefinition>;

fn merge_groups<'a, I>(
    kind: GroupKind,
    sources: I,
    conflicts: &mut Vec<SchemaConflict>,
) -> (Groups, BTreeSet<String>)
where
    I: Iterator<Item = (&'a str, &'a Groups, &'a BTreeSet<String>)>,
{
    // group -> declarations in contribution order; `None` marks a group the
    // contribution already reports as conflicted
    let mut declarations: BTreeMap<&str, Vec<(&str, Option<&ElementDefinition>)>> =
        BTreeMap::new();
    for (endpoint, groups, conflicted) in sources {
        for (group, definition) in groups {
            declarations
                .entry(group.as_str())
                .or_default()
                .push((endpoint, Some(definition)));
        }
        for group in conflicted {
            declarations
                .entry(group.as_str())
                .or_default()
                .push((endpoint, None));
        }
    }

    let mut merged = BTreeMap::new();
    let mut dropped = BTreeSet::new();
    for (group, decls) in declarations {
        let failure = match decls.iter().find(|(_, def)| def.is_none()) {
            Some((endpoint, _)) => Err(format!("already conflicted in '{}'", endpoint)),
            None => fold_definitions(decls.iter().filter_map(|(_, def)| *def)),
        };

        match failure {
            Ok(Some(definition)) => {
                merged.insert(group.to_string(), definition);
            }
            Ok(None) => {}
            Err(reason) => {
                let mut endpoints: Vec<String> = Vec::with_capacity(decls.len());
                for (endpoint, _) in &decls {
                    if !endpoints.iter().any(|e| e.as_str() == *endpoint) {
                        endpoints.push(endpoint.to_string());
                    }
                }
                dropped.insert(group.to_string());
                conflicts.push(SchemaConflict {
                    group: group.to_string(),
                    kind,
                    endpoints,
                    reason,
                });
            }
        }
    }
    (merged, dropped)
}

fn fold_definitions<'a, I>(mut definitions: I) -> Result<Option<ElementDefinition>, String>
where
    I: Iterator<Item = &'a ElementDefinition>,
{
    let Some(first) = definitions.next() else {
        return Ok(None);
    };
    let mut acc = first.clone();
    for definition in definitions {
        merge_definition(&mut acc, definition)?;
    }
    Ok(Some(acc))
}

/// Fold `other` into `acc`, or explain why the two are incompatible.
fn merge_definition(acc: &mut ElementDefinition, other: &ElementDefinition) -> Result<(), String> {
    merge_identifier("vertex", &mut acc.vertex, &other.vertex)?;
    merge_identifier("source", &mut acc.source, &other.source)?;
    merge_identifier("destination", &mut acc.destination, &other.destination)?;
    merge_identifier("directed", &mut acc.directed, &other.directed)?;

    for (property, type_name) in &other.properties {
        match acc.properties.get(property) {
            Some(existing) if existing != type_name => {
                return Err(format!(
                    "property '{}' has type '{}' and '{}'",
                    property, existing, type_name
                ));
            }
            Some(_) => {}
            None => {
                acc.properties.insert(property.clone(), type_name.clone());
            }
        }
    }

    acc.group_by.extend(other.group_by.iter().cloned());

    // Lowest description wins so the result does not depend on order
    acc.description = match (acc.description.take(), &other.description) {
        (Some(a), Some(b)) => Some(a.min(b.clone())),
        (a, b) => a.or_else(|| b.clone()),
    };
    Ok(())
}

fn merge_identifier(
    field: &str,
    acc: &mut Option<String>,
    other: &Option<String>,
) -> Result<(), String> {
    match (acc.as_ref(), other) {
        (Some(a), Some(b)) if a != b => Err(format!("{} has type '{}' and '{}'", field, a, b)),
        (None, Some(b)) => {
            *acc = Some(b.clone());
            Ok(())
        }
        _ => Ok(()),
    }
}

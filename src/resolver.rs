//! Type resolver: answers type questions about identifiers endpoints report.
//!
//! Endpoints describe functions and element types by stable string
//! identifiers. The federation layer never loads or inspects those types
//! itself; it asks a [`TypeResolver`], backed by a registered table of
//! descriptors (supplied by the endpoints or a schema registry), for
//! assignability, function input types and serialised field lists.
//!
//! ```yaml
//! types:
//!   - id: java.lang.Integer
//!     supertypes: [java.lang.Number, java.lang.Comparable, java.lang.Object]
//!     fields: []
//! functions:
//!   - id: uk.gov.gchq.koryphe.impl.predicate.IsMoreThan
//!     input_types: [java.lang.Comparable]
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Everything the resolver knows about one type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub id: String,

    /// Every type this one can be assigned to, excluding itself
    #[serde(default)]
    pub supertypes: BTreeSet<String>,

    /// Fields included when an instance is serialised
    #[serde(default)]
    pub fields: BTreeSet<String>,
}

impl TypeDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_supertypes<I, S>(mut self, supertypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supertypes.extend(supertypes.into_iter().map(Into::into));
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Whether a value of this type can be passed where `target` is expected.
    pub fn is_assignable_to(&self, target: &str) -> bool {
        self.id == target || self.supertypes.contains(target)
    }
}

/// Declared signature of a filter or transform function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub id: String,

    #[serde(default)]
    pub input_types: Vec<String>,
}

impl FunctionSignature {
    pub fn new<I, S>(id: impl Into<String>, input_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            input_types: input_types.into_iter().map(Into::into).collect(),
        }
    }
}

/// Lookup interface for type and function descriptors.
pub trait TypeResolver: Send + Sync {
    fn type_descriptor(&self, id: &str) -> Option<TypeDescriptor>;

    fn function_signature(&self, id: &str) -> Option<FunctionSignature>;

    /// Whether `function` takes exactly one input that `input` is assignable
    /// to. `None` when that cannot be determined: unknown function, a
    /// function without exactly one declared input, or an unknown type.
    fn accepts_single_input(&self, function: &str, input: &TypeDescriptor) -> Option<bool> {
        let signature = self.function_signature(function)?;
        match signature.input_types.as_slice() {
            [only] => Some(input.is_assignable_to(only)),
            _ => None,
        }
    }
}

/// In-memory resolver backed by registered descriptors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeRegistry {
    #[serde(default)]
    types: Vec<TypeDescriptor>,

    #[serde(default)]
    functions: Vec<FunctionSignature>,

    #[serde(skip)]
    type_index: HashMap<String, usize>,

    #[serde(skip)]
    function_index: HashMap<String, usize>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a registry from YAML (or JSON, which YAML accepts).
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut registry: TypeRegistry = serde_yaml::from_str(yaml)?;
        registry.reindex();
        Ok(registry)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let registry = Self::from_yaml(&content)?;
        tracing::info!(
            path = %path.display(),
            types = registry.types.len(),
            functions = registry.functions.len(),
            "Loaded type registry"
        );
        Ok(registry)
    }

    /// Register (or replace) a type descriptor.
    pub fn register_type(&mut self, descriptor: TypeDescriptor) {
        match self.type_index.get(&descriptor.id) {
            Some(&i) => self.types[i] = descriptor,
            None => {
                self.type_index
                    .insert(descriptor.id.clone(), self.types.len());
                self.types.push(descriptor);
            }
        }
    }

    /// Register (or replace) a function signature.
    pub fn register_function(&mut self, signature: FunctionSignature) {
        match self.function_index.get(&signature.id) {
            Some(&i) => self.functions[i] = signature,
            None => {
                self.function_index
                    .insert(signature.id.clone(), self.functions.len());
                self.functions.push(signature);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.types.len() + self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.functions.is_empty()
    }

    fn reindex(&mut self) {
        let types = std::mem::take(&mut self.types);
        let functions = std::mem::take(&mut self.functions);
        self.type_index.clear();
        self.function_index.clear();
        for descriptor in types {
            self.register_type(descriptor);
        }
        for signature in functions {
            self.register_function(signature);
        }
    }
}

impl TypeResolver for TypeRegistry {
    fn type_descriptor(&self, id: &str) -> Option<TypeDescriptor> {
        self.type_index.get(id).map(|&i| self.types[i].clone())
    }

    fn function_signature(&self, id: &str) -> Option<FunctionSignature> {
        self.function_index
            .get(id)
            .map(|&i| self.functions[i].clone())
    }
}

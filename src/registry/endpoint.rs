//! Endpoint: a named, addressable backing graph store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A registered graph endpoint.
///
/// The address is an opaque connection descriptor (for the HTTP source, a
/// base URL such as `http://host:8080/rest/v1`). The registry compares it by
/// equality only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    /// Logical name, unique within the registry.
    pub name: String,

    /// Connection descriptor, unique within the registry.
    #[serde(rename = "url")]
    pub address: String,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

//! CapabilitySource trait: the contract for endpoint introspection.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capabilities::CapabilitySnapshot;
use crate::registry::Endpoint;

/// Retrieves the capability description of one endpoint.
///
/// Each endpoint exposes its own introspection surface; a source adapts that
/// surface (REST, in-process, ...) into a [`CapabilitySnapshot`]. Sources
/// report failure as a [`FetchError`] value and must not panic on a bad
/// endpoint.
#[async_trait]
pub trait CapabilitySource: Send + Sync {
    /// Human-readable source name (e.g. "HTTP")
    fn name(&self) -> &str;

    /// Fetch schema, operations, functions, generators and traits.
    ///
    /// `timeout` bounds every call the source makes to the endpoint. The
    /// fetcher enforces the same deadline on the whole fetch regardless.
    async fn fetch(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<CapabilitySnapshot, FetchError>;
}

/// Why an endpoint could not contribute to a refresh.
///
/// The coordinator treats every variant the same way: the endpoint is
/// excluded from the merge and marked unreachable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Classification of a [`FetchError`], recorded in the endpoint's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Unreachable,
    Timeout,
    Protocol,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Unreachable(_) => FetchErrorKind::Unreachable,
            Self::Timeout(_) => FetchErrorKind::Timeout,
            Self::Protocol(_) => FetchErrorKind::Protocol,
        }
    }

    pub(crate) fn timeout(after: Duration) -> Self {
        Self::Timeout(after.as_millis() as u64)
    }
}

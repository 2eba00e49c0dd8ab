//! HTTP capability source: reads a graph endpoint's REST introspection API.
//!
//! ## Endpoint surface
//!
//! ```text
//! GET {base}/graph/schema             → Schema
//! GET {base}/graph/operations         → [operation id]
//! GET {base}/graph/filterFunctions    → [function id]
//! GET {base}/graph/transformFunctions → [function id]
//! GET {base}/graph/elementGenerators  → [generator id]
//! GET {base}/graph/objectGenerators   → [generator id]
//! GET {base}/graph/storeTraits        → [trait id]
//! ```
//!
//! The seven calls are issued concurrently; any failure fails the fetch.
//! `{base}` is the endpoint address, with `http://` prepended when it has no
//! scheme.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::source::{CapabilitySource, FetchError};
use crate::capabilities::{CapabilitySnapshot, Schema, StoreTrait};
use crate::registry::Endpoint;

/// REST capability source backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpCapabilitySource {
    client: reqwest::Client,
}

impl HttpCapabilitySource {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("graph-federation/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Protocol(format!("HTTP client init failed: {}", e)))?;
        Ok(Self { client })
    }

    /// Use an existing client (shared connection pool, custom TLS, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        base: &str,
        path: &str,
        timeout: Duration,
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", base, path);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(&url, e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Protocol(format!(
                "GET {} returned HTTP {}",
                url,
                status.as_u16()
            )));
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(timeout)
            } else {
                FetchError::Protocol(format!("GET {} returned an invalid body: {}", url, e))
            }
        })
    }
}

#[async_trait]
impl CapabilitySource for HttpCapabilitySource {
    fn name(&self) -> &str {
        "HTTP"
    }

    async fn fetch(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<CapabilitySnapshot, FetchError> {
        let base = base_url(&endpoint.address);

        let (
            schema,
            operations,
            filter_functions,
            transform_functions,
            element_gens,
            object_gens,
            traits,
        ) = tokio::try_join!(
            self.get_json::<Schema>(&base, "/graph/schema", timeout),
            self.get_json::<BTreeSet<String>>(&base, "/graph/operations", timeout),
            self.get_json::<BTreeSet<String>>(&base, "/graph/filterFunctions", timeout),
            self.get_json::<BTreeSet<String>>(&base, "/graph/transformFunctions", timeout),
            self.get_json::<BTreeSet<String>>(&base, "/graph/elementGenerators", timeout),
            self.get_json::<BTreeSet<String>>(&base, "/graph/objectGenerators", timeout),
            self.get_json::<BTreeSet<StoreTrait>>(&base, "/graph/storeTraits", timeout),
        )?;

        let mut generators = element_gens;
        generators.extend(object_gens);

        Ok(CapabilitySnapshot {
            schema,
            operations,
            filter_functions,
            transform_functions,
            generators,
            traits,
        })
    }
}

/// Normalise an endpoint address into a base URL without a trailing slash.
pub fn base_url(address: &str) -> String {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

fn classify(url: &str, error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::timeout(timeout)
    } else if error.is_connect() || error.is_request() {
        FetchError::Unreachable(format!("{}: {}", url, error))
    } else {
        FetchError::Protocol(format!("{}: {}", url, error))
    }
}

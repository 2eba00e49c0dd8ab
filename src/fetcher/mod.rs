//! # Capability Fetcher
//!
//! Retrieves capability snapshots from registered endpoints.
//!
//! ```text
//! fetch_all([e1, e2, e3])
//!   ├── fetch_one(e1) ─┐
//!   ├── fetch_one(e2) ─┼─ at most `max_concurrency` in flight,
//!   └── fetch_one(e3) ─┘  each bounded by `timeout`
//!   ▼
//! [outcome(e1), outcome(e2), outcome(e3)]   (input order)
//! ```
//!
//! A slow endpoint costs at most `timeout` and only occupies its own slot;
//! the others keep completing around it. Timed-out fetches are not retried
//! within the same call.

pub mod http;
pub mod in_memory;
pub mod source;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};

pub use http::HttpCapabilitySource;
pub use in_memory::InMemoryCapabilitySource;
pub use source::{CapabilitySource, FetchError, FetchErrorKind};

use crate::capabilities::CapabilitySnapshot;
use crate::registry::Endpoint;

/// Result of fetching one endpoint.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub endpoint: Endpoint,
    pub result: Result<CapabilitySnapshot, FetchError>,
    /// Wall time spent on the fetch, success or not
    pub latency: Duration,
}

/// Fans capability fetches out over a [`CapabilitySource`].
pub struct CapabilityFetcher {
    source: Arc<dyn CapabilitySource>,
    timeout: Duration,
    max_concurrency: usize,
}

impl std::fmt::Debug for CapabilityFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityFetcher")
            .field("source", &self.source.name())
            .field("timeout", &self.timeout)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl CapabilityFetcher {
    /// Create a fetcher. A `max_concurrency` of 0 is treated as 1.
    pub fn new(
        source: Arc<dyn CapabilitySource>,
        timeout: Duration,
        max_concurrency: usize,
    ) -> Self {
        Self {
            source,
            timeout,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch one endpoint, bounded by the fetcher's timeout.
    pub async fn fetch_one(&self, endpoint: &Endpoint) -> FetchOutcome {
        let started = Instant::now();
        let fetch = self.source.fetch(endpoint, self.timeout);
        let result = match tokio::time::timeout(self.timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::timeout(self.timeout)),
        };
        let latency = started.elapsed();

        match &result {
            Ok(_) => tracing::debug!(
                endpoint = %endpoint.name,
                latency_ms = latency.as_millis() as u64,
                "Fetched capabilities"
            ),
            Err(e) => tracing::warn!(
                endpoint = %endpoint.name,
                address = %endpoint.address,
                error = %e,
                "Capability fetch failed"
            ),
        }

        FetchOutcome {
            endpoint: endpoint.clone(),
            result,
            latency,
        }
    }

    /// Fetch every endpoint concurrently. The returned outcomes are in the
    /// same order as `endpoints`, independent of completion order.
    ///
    /// Completions are consumed as they arrive, so a slow endpoint holds only
    /// its own slot while later endpoints start in the freed ones.
    pub async fn fetch_all(&self, endpoints: &[Endpoint]) -> Vec<FetchOutcome> {
        // Owned items keep the returned future `Send` for spawned refreshes
        let plan: Vec<(usize, Endpoint)> = endpoints.iter().cloned().enumerate().collect();

        let mut indexed: Vec<(usize, FetchOutcome)> = stream::iter(plan)
            .map(|(index, endpoint)| async move {
                let outcome = self.fetch_one(&endpoint).await;
                (index, outcome)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

//! In-process capability source.
//!
//! Serves scripted snapshots keyed by endpoint address. Used to embed the
//! federation layer in front of stores living in the same process, and to
//! drive refreshes deterministically in tests (per-address failures and
//! delays).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::source::{CapabilitySource, FetchError};
use crate::capabilities::CapabilitySnapshot;
use crate::registry::Endpoint;

#[derive(Debug, Clone)]
struct Scripted {
    response: Result<CapabilitySnapshot, FetchError>,
    delay: Option<Duration>,
}

/// Capability source answering from an in-memory table.
///
/// Addresses with no entry are reported as unreachable.
#[derive(Debug, Default)]
pub struct InMemoryCapabilitySource {
    entries: RwLock<HashMap<String, Scripted>>,
    fetch_counts: RwLock<HashMap<String, usize>>,
}

impl InMemoryCapabilitySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `snapshot` for `address`, keeping any configured delay.
    pub fn set_snapshot(&self, address: &str, snapshot: CapabilitySnapshot) {
        self.set_response(address, Ok(snapshot));
    }

    /// Fail every fetch of `address` with `error`.
    pub fn set_failure(&self, address: &str, error: FetchError) {
        self.set_response(address, Err(error));
    }

    /// Delay every fetch of `address` by `delay` before answering.
    pub fn set_delay(&self, address: &str, delay: Duration) {
        let mut entries = self.entries.write();
        let entry = entries.entry(address.to_string()).or_insert_with(|| Scripted {
            response: Err(FetchError::Unreachable(address.to_string())),
            delay: None,
        });
        entry.delay = Some(delay);
    }

    pub fn clear_delay(&self, address: &str) {
        if let Some(entry) = self.entries.write().get_mut(address) {
            entry.delay = None;
        }
    }

    pub fn remove(&self, address: &str) {
        self.entries.write().remove(address);
    }

    /// How many fetches have been started for `address`.
    pub fn fetch_count(&self, address: &str) -> usize {
        self.fetch_counts.read().get(address).copied().unwrap_or(0)
    }

    fn set_response(&self, address: &str, response: Result<CapabilitySnapshot, FetchError>) {
        let mut entries = self.entries.write();
        match entries.get_mut(address) {
            Some(entry) => entry.response = response,
            None => {
                entries.insert(
                    address.to_string(),
                    Scripted {
                        response,
                        delay: None,
                    },
                );
            }
        }
    }
}

#[async_trait]
impl CapabilitySource for InMemoryCapabilitySource {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn fetch(
        &self,
        endpoint: &Endpoint,
        _timeout: Duration,
    ) -> Result<CapabilitySnapshot, FetchError> {
        *self
            .fetch_counts
            .write()
            .entry(endpoint.address.clone())
            .or_default() += 1;

        let scripted = self.entries.read().get(&endpoint.address).cloned();
        let Some(scripted) = scripted else {
            return Err(FetchError::Unreachable(format!(
                "no endpoint at {}",
                endpoint.address
            )));
        };

        if let Some(delay) = scripted.delay {
            tokio::time::sleep(delay).await;
        }
        scripted.response
    }
}

//! # Federation Coordinator
//!
//! Owns the published [`FederatedSnapshot`] and is its only writer.
//!
//! ```text
//! refresh()
//!   → lock refresh mutex          (refreshes queue, FIFO)
//!   → registry.snapshot()         fetch plan, registry order
//!   → fetcher.fetch_all(plan)     concurrent, per-endpoint timeout
//!   → merge(successes)
//!   → swap in Arc<FederatedSnapshot> (generation + 1)
//! ```
//!
//! Readers call [`FederationCoordinator::current`], which clones the
//! published `Arc` under a lock held only for the pointer copy. A reader
//! never waits on network I/O and never sees a partially built snapshot:
//! the new snapshot is complete before it is swapped in.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::capabilities::{merge, EndpointStatus, FederatedSnapshot};
use crate::fetcher::{CapabilityFetcher, FetchError};
use crate::registry::EndpointRegistry;

/// Refresh state machine: `Idle → Refreshing → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Refreshing,
}

pub struct FederationCoordinator {
    registry: Arc<EndpointRegistry>,
    fetcher: CapabilityFetcher,

    /// Last published snapshot
    current: RwLock<Arc<FederatedSnapshot>>,

    /// Serializes refreshes: single writer of `current`
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for FederationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationCoordinator")
            .field("registry", &self.registry)
            .field("fetcher", &self.fetcher)
            .field("generation", &self.current.read().generation)
            .finish()
    }
}

impl FederationCoordinator {
    /// Create a coordinator publishing the empty startup snapshot.
    pub fn new(registry: Arc<EndpointRegistry>, fetcher: CapabilityFetcher) -> Self {
        Self {
            registry,
            fetcher,
            current: RwLock::new(Arc::new(FederatedSnapshot::empty())),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    /// The most recently published snapshot.
    pub fn current(&self) -> Arc<FederatedSnapshot> {
        self.current.read().clone()
    }

    pub fn state(&self) -> CoordinatorState {
        match self.refresh_lock.try_lock() {
            Ok(_) => CoordinatorState::Idle,
            Err(_) => CoordinatorState::Refreshing,
        }
    }

    /// Re-fetch every registered endpoint, merge the reachable ones and
    /// publish the result as a new generation.
    ///
    /// Always publishes, even when every endpoint fails. Returns one status
    /// per registered endpoint, in registry order.
    pub async fn refresh(&self) -> Vec<EndpointStatus> {
        let _guard = self.refresh_lock.lock().await;

        let plan = self.registry.snapshot();
        let outcomes = self.fetcher.fetch_all(&plan).await;

        let statuses: Vec<EndpointStatus> = outcomes
            .iter()
            .map(|outcome| EndpointStatus {
                endpoint: outcome.endpoint.clone(),
                reachable: outcome.result.is_ok(),
                error: outcome.result.as_ref().err().map(|e| e.to_string()),
                error_kind: outcome.result.as_ref().err().map(FetchError::kind),
                latency: Some(outcome.latency),
            })
            .collect();

        let merged = merge(outcomes.iter().filter_map(|outcome| {
            outcome
                .result
                .as_ref()
                .ok()
                .map(|snapshot| (outcome.endpoint.name.as_str(), snapshot))
        }));

        for conflict in &merged.conflicts {
            tracing::warn!(
                group = %conflict.group,
                kind = %conflict.kind,
                endpoints = ?conflict.endpoints,
                reason = %conflict.reason,
                "Schema conflict, group dropped from federated schema"
            );
        }

        let generation = self.current.read().generation + 1;
        let snapshot = FederatedSnapshot {
            generation,
            published_at: Utc::now(),
            capabilities: merged.snapshot,
            statuses: statuses.clone(),
            conflicts: merged.conflicts,
        };

        tracing::info!(
            generation,
            endpoints = statuses.len(),
            reachable = snapshot.reachable_count(),
            conflicts = snapshot.conflicts.len(),
            "Published federated snapshot"
        );

        *self.current.write() = Arc::new(snapshot);
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{CapabilitySnapshot, ElementDefinition, StoreTrait};
    use crate::fetcher::{FetchErrorKind, InMemoryCapabilitySource};
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn coordinator(
        source: Arc<InMemoryCapabilitySource>,
        timeout: Duration,
    ) -> (Arc<EndpointRegistry>, Arc<FederationCoordinator>) {
        let registry = Arc::new(EndpointRegistry::new());
        let fetcher = CapabilityFetcher::new(source, timeout, 8);
        let coordinator = Arc::new(FederationCoordinator::new(registry.clone(), fetcher));
        (registry, coordinator)
    }

    #[tokio::test]
    async fn test_starts_with_empty_snapshot() {
        let source = Arc::new(InMemoryCapabilitySource::new());
        let (_, coordinator) = coordinator(source, Duration::from_secs(1));

        let current = coordinator.current();
        assert_eq!(current.generation, 0);
        assert!(current.capabilities.operations.is_empty());
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }

    #[tokio::test]
    async fn test_partial_failure_resilience() {
        let source = Arc::new(InMemoryCapabilitySource::new());
        source.set_snapshot(
            "h1",
            CapabilitySnapshot::new()
                .with_operations(["Get"])
                .with_traits(["A", "B"]),
        );
        source.set_snapshot("h2", CapabilitySnapshot::new().with_operations(["Slow"]));
        source.set_delay("h2", Duration::from_secs(30));
        source.set_snapshot(
            "h3",
            CapabilitySnapshot::new()
                .with_operations(["Add"])
                .with_traits(["B", "C"]),
        );

        let (registry, coordinator) = coordinator(source, Duration::from_millis(100));
        registry.add("g1", "h1").unwrap();
        registry.add("g2", "h2").unwrap();
        registry.add("g3", "h3").unwrap();

        let statuses = coordinator.refresh().await;

        assert_eq!(statuses.len(), 3);
        assert!(statuses[0].reachable);
        assert!(!statuses[1].reachable);
        assert_eq!(statuses[1].endpoint.name, "g2");
        assert!(statuses[1].error.as_deref().unwrap().contains("Timeout"));
        assert_eq!(statuses[1].error_kind, Some(FetchErrorKind::Timeout));
        assert_eq!(statuses[0].error_kind, None);
        assert!(statuses[2].reachable);

        let current = coordinator.current();
        assert_eq!(current.generation, 1);
        assert_eq!(current.statuses, statuses);
        let expected: BTreeSet<String> = ["Add", "Get"].iter().map(|s| s.to_string()).collect();
        assert_eq!(current.capabilities.operations, expected);
        assert_eq!(
            current.capabilities.traits,
            [StoreTrait::from("B")].into_iter().collect()
        );
    }

    #[tokio::test]
    async fn test_all_unreachable_still_publishes() {
        let source = Arc::new(InMemoryCapabilitySource::new());
        source.set_failure("h1", FetchError::Protocol("garbage".into()));

        let (registry, coordinator) = coordinator(source, Duration::from_secs(1));
        registry.add("g1", "h1").unwrap();
        registry.add("g2", "h2").unwrap();

        let statuses = coordinator.refresh().await;
        assert!(statuses.iter().all(|s| !s.reachable));
        assert_eq!(statuses[0].error_kind, Some(FetchErrorKind::Protocol));
        assert_eq!(statuses[1].error_kind, Some(FetchErrorKind::Unreachable));

        let current = coordinator.current();
        assert_eq!(current.generation, 1);
        assert_eq!(current.capabilities, CapabilitySnapshot::default());
        assert_eq!(current.statuses.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_endpoint_retried_on_next_refresh() {
        let source = Arc::new(InMemoryCapabilitySource::new());
        let (registry, coordinator) = coordinator(source.clone(), Duration::from_secs(1));
        registry.add("g1", "h1").unwrap();

        let first = coordinator.refresh().await;
        assert!(!first[0].reachable);

        source.set_snapshot("h1", CapabilitySnapshot::new().with_operations(["Get"]));
        let second = coordinator.refresh().await;
        assert!(second[0].reachable);
        assert_eq!(source.fetch_count("h1"), 2);
        assert!(coordinator.current().capabilities.operations.contains("Get"));
    }

    #[tokio::test]
    async fn test_schema_conflict_recorded_not_fatal() {
        let source = Arc::new(InMemoryCapabilitySource::new());
        let person = |age: &str| ElementDefinition::entity("string").with_property("age", age);
        source.set_snapshot(
            "h1",
            CapabilitySnapshot::new()
                .with_entity("person", person("int"))
                .with_entity("place", ElementDefinition::entity("string")),
        );
        source.set_snapshot("h2", CapabilitySnapshot::new().with_entity("person", person("long")));

        let (registry, coordinator) = coordinator(source, Duration::from_secs(1));
        registry.add("g1", "h1").unwrap();
        registry.add("g2", "h2").unwrap();

        let statuses = coordinator.refresh().await;
        assert!(statuses.iter().all(|s| s.reachable));

        let current = coordinator.current();
        assert_eq!(current.conflicts.len(), 1);
        assert!(current.capabilities.schema.conflicted_entities.contains("person"));
        assert_eq!(current.conflicts[0].endpoints, vec!["g1", "g2"]);
        assert!(current.capabilities.schema.entities.contains_key("place"));
        assert!(!current.capabilities.schema.entities.contains_key("person"));
    }

    #[tokio::test]
    async fn test_endpoint_recovers_and_disappears_between_refreshes() {
        let source = Arc::new(InMemoryCapabilitySource::new());
        source.set_snapshot("h1", CapabilitySnapshot::new().with_operations(["Get"]));
        source.set_delay("h1", Duration::from_secs(30));

        let (registry, coordinator) = coordinator(source.clone(), Duration::from_millis(50));
        registry.add("g1", "h1").unwrap();

        let slow = coordinator.refresh().await;
        assert_eq!(slow[0].error_kind, Some(FetchErrorKind::Timeout));

        source.clear_delay("h1");
        let recovered = coordinator.refresh().await;
        assert!(recovered[0].reachable);
        assert!(coordinator.current().capabilities.operations.contains("Get"));

        source.remove("h1");
        let gone = coordinator.refresh().await;
        assert_eq!(gone[0].error_kind, Some(FetchErrorKind::Unreachable));
        assert!(coordinator.current().capabilities.operations.is_empty());
        assert_eq!(coordinator.current().generation, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_readers_see_previous_generation_during_refresh() {
        let source = Arc::new(InMemoryCapabilitySource::new());
        source.set_snapshot("h1", CapabilitySnapshot::new().with_operations(["Get"]));
        source.set_delay("h1", Duration::from_millis(300));

        let (registry, coordinator) = coordinator(source, Duration::from_secs(5));
        registry.add("g1", "h1").unwrap();

        let refresh = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.refresh().await }
        });

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while coordinator.state() != CoordinatorState::Refreshing {
            assert!(std::time::Instant::now() < deadline, "refresh never started");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let started = std::time::Instant::now();
        let during = coordinator.current();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(during.generation, 0);
        assert!(during.capabilities.operations.is_empty());

        let statuses = refresh.await.unwrap();
        assert!(statuses[0].reachable);
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert_eq!(coordinator.current().generation, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refreshes_serialize_into_distinct_generations() {
        let source = Arc::new(InMemoryCapabilitySource::new());
        source.set_snapshot("h1", CapabilitySnapshot::new());
        source.set_delay("h1", Duration::from_millis(20));

        let (registry, coordinator) = coordinator(source.clone(), Duration::from_secs(1));
        registry.add("g1", "h1").unwrap();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.refresh().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(coordinator.current().generation, 5);
        assert_eq!(source.fetch_count("h1"), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_observe_torn_snapshot() {
        let source = Arc::new(InMemoryCapabilitySource::new());
        for i in 1..=3 {
            let address = format!("h{}", i);
            source.set_delay(&address, Duration::from_millis(5 * i as u64));
        }

        let (registry, coordinator) = coordinator(source.clone(), Duration::from_secs(1));
        for i in 1..=3 {
            registry.add(&format!("g{}", i), &format!("h{}", i)).unwrap();
        }

        let reader = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let mut observed = 0;
                while observed < 200 {
                    let snapshot = coordinator.current();
                    // Every endpoint serves `V{generation}` for that generation,
                    // so a consistent snapshot carries exactly one version tag.
                    if snapshot.generation > 0 {
                        let expected = format!("V{}", snapshot.generation);
                        assert_eq!(snapshot.capabilities.operations.len(), 1);
                        assert!(snapshot.capabilities.operations.contains(&expected));
                        assert_eq!(snapshot.statuses.len(), 3);
                    } else {
                        assert!(snapshot.capabilities.operations.is_empty());
                    }
                    observed += 1;
                    tokio::task::yield_now().await;
                }
            })
        };

        for generation in 1..=5u64 {
            for i in 1..=3 {
                source.set_snapshot(
                    &format!("h{}", i),
                    CapabilitySnapshot::new().with_operations([format!("V{}", generation)]),
                );
            }
            coordinator.refresh().await;
        }

        reader.await.unwrap();
        assert_eq!(coordinator.current().generation, 5);
    }
}

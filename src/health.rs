//! TTL-bounded node health cache
//!
//! Probes every enabled node concurrently, caches latency and
//! availability, and answers advisory selection queries. Health here is
//! advisory only: the failover path reads preference from it but never
//! eligibility, and everything in it is safe to lose on restart.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::backend::traits::GenerationBackend;
use crate::config::SelectionStrategy;
use crate::error::{ClientError, Result};
use crate::registry::Node;

/// Consecutive failures at which a node drops out of advisory selection.
pub const FAILOVER_THRESHOLD: u32 = 3;

/// Last-known health of one node. Exactly one record per node id.
#[derive(Debug, Clone)]
pub struct NodeHealth {
    pub node_id: String,
    /// Round-trip probe latency; `None` means unknown/infinite
    pub latency: Option<Duration>,
    pub is_available: bool,
    pub last_checked: Instant,
    pub consecutive_failures: u32,
}

impl NodeHealth {
    fn probed_ok(node_id: &str, latency: Duration) -> Self {
        Self {
            node_id: node_id.to_string(),
            latency: Some(latency),
            is_available: true,
            last_checked: Instant::now(),
            consecutive_failures: 0,
        }
    }

    fn probed_failed(node_id: &str, consecutive_failures: u32) -> Self {
        Self {
            node_id: node_id.to_string(),
            latency: None,
            is_available: false,
            last_checked: Instant::now(),
            consecutive_failures,
        }
    }
}

/// A node paired with its adapter, as tracked by the health cache.
pub struct TrackedNode {
    pub node: Node,
    pub backend: Arc<dyn GenerationBackend>,
}

impl TrackedNode {
    pub fn new(node: Node, backend: Arc<dyn GenerationBackend>) -> Self {
        Self { node, backend }
    }
}

/// Injectable health cache with an explicit construct/reset lifecycle.
pub struct HealthTracker {
    entries: Vec<TrackedNode>,
    records: DashMap<String, NodeHealth>,
    round_robin_cursor: Mutex<usize>,
    cache_ttl: Duration,
}

impl HealthTracker {
    pub fn new(entries: Vec<TrackedNode>, cache_ttl: Duration) -> Self {
        Self {
            entries,
            records: DashMap::new(),
            round_robin_cursor: Mutex::new(0),
            cache_ttl,
        }
    }

    /// Probe every enabled node concurrently and record the results.
    ///
    /// Probes are cheap and side-effect-free, so fanning them out is safe;
    /// all of them are joined before returning.
    pub async fn probe_all(&self) {
        let probes = self
            .entries
            .iter()
            .filter(|e| e.node.is_enabled())
            .map(|entry| async move {
                let outcome = entry.backend.probe().await;
                (entry.node.id().to_string(), outcome)
            });

        for (node_id, outcome) in futures::future::join_all(probes).await {
            match outcome {
                Ok(latency) => {
                    debug!(
                        node = %node_id,
                        latency_ms = latency.as_millis() as u64,
                        "Health probe passed"
                    );
                    self.records
                        .insert(node_id.clone(), NodeHealth::probed_ok(&node_id, latency));
                }
                Err(e) => {
                    let failures = self
                        .records
                        .get(&node_id)
                        .map(|h| h.consecutive_failures)
                        .unwrap_or(0)
                        + 1;
                    warn!(node = %node_id, failures, "Health probe failed: {}", e);
                    self.records.insert(
                        node_id.clone(),
                        NodeHealth::probed_failed(&node_id, failures),
                    );
                }
            }
        }
    }

    /// Pick one node by the requested strategy.
    ///
    /// Re-probes first if any enabled node's record is missing or older
    /// than the TTL. Nodes filtered out here are only disfavored for
    /// advisory callers; the failover loop still attempts them.
    pub async fn select_node(&self, strategy: SelectionStrategy) -> Result<Node> {
        let enabled: Vec<&TrackedNode> = self
            .entries
            .iter()
            .filter(|e| e.node.is_enabled())
            .collect();

        if enabled.is_empty() {
            return Err(ClientError::Validation(
                "No enabled nodes available".to_string(),
            ));
        }

        let stale = enabled.iter().any(|e| {
            self.records
                .get(e.node.id())
                .map_or(true, |h| h.last_checked.elapsed() > self.cache_ttl)
        });
        if stale {
            self.probe_all().await;
        }

        // No suspension points below: the decision reads the cache and
        // acts on it atomically with respect to other tasks.
        let healthy: Vec<&TrackedNode> = enabled
            .iter()
            .filter(|e| {
                self.records.get(e.node.id()).map_or(true, |h| {
                    h.is_available && h.consecutive_failures < FAILOVER_THRESHOLD
                })
            })
            .copied()
            .collect();

        if healthy.is_empty() {
            // Liveness over correctness: always attempt something.
            let first = enabled
                .iter()
                .min_by_key(|e| e.node.priority())
                .map(|e| e.node.clone());
            return match first {
                Some(node) => {
                    warn!(
                        node = %node.id(),
                        "All nodes unhealthy; degraded mode falls back to the highest-priority node"
                    );
                    Ok(node)
                }
                None => Err(ClientError::Validation(
                    "No enabled nodes available".to_string(),
                )),
            };
        }

        let chosen = match strategy {
            SelectionStrategy::Priority => healthy
                .iter()
                .min_by_key(|e| e.node.priority())
                .map(|e| &e.node),
            SelectionStrategy::Latency => healthy
                .iter()
                .min_by_key(|e| {
                    self.records
                        .get(e.node.id())
                        .and_then(|h| h.latency)
                        .unwrap_or(Duration::MAX)
                })
                .map(|e| &e.node),
            SelectionStrategy::RoundRobin => {
                let mut cursor = self.round_robin_cursor.lock();
                let pick = &healthy[*cursor % healthy.len()].node;
                *cursor += 1;
                Some(pick)
            }
        };

        let node = chosen.unwrap_or(&healthy[0].node).clone();
        debug!(node = %node.id(), strategy = ?strategy, "Selected node");
        Ok(node)
    }

    /// Record a generation failure for a node, independent of any probe.
    pub fn mark_failed(&self, node_id: &str) {
        let mut record = self
            .records
            .entry(node_id.to_string())
            .or_insert_with(|| NodeHealth {
                node_id: node_id.to_string(),
                latency: None,
                is_available: true,
                last_checked: Instant::now(),
                consecutive_failures: 0,
            });
        record.consecutive_failures += 1;
        record.is_available = false;
        warn!(
            node = %node_id,
            failures = record.consecutive_failures,
            "Marked node failed"
        );
    }

    /// Reset the failure count after a verified success (probe or
    /// generation). Never called on mere elapsed time.
    pub fn mark_succeeded(&self, node_id: &str) {
        if let Some(mut record) = self.records.get_mut(node_id) {
            record.consecutive_failures = 0;
            record.is_available = true;
        }
    }

    pub fn get(&self, node_id: &str) -> Option<NodeHealth> {
        self.records.get(node_id).map(|h| h.clone())
    }

    pub fn all(&self) -> Vec<NodeHealth> {
        self.records.iter().map(|h| h.clone()).collect()
    }

    /// Drop all cached state. Primarily for test isolation.
    pub fn reset(&self) {
        self.records.clear();
        *self.round_robin_cursor.lock() = 0;
    }
}

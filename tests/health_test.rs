//! Health tracker probe, selection, and TTL tests

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sketchgen_client::backend::traits::{GenerationBackend, GenerationRequest};
use sketchgen_client::config::{NodeConfig, NodeMode, SelectionStrategy};
use sketchgen_client::error::{ClientError, Result};
use sketchgen_client::health::{HealthTracker, TrackedNode};
use sketchgen_client::registry::Node;

fn node(id: &str, priority: u32) -> Node {
    Node::new(
        NodeConfig {
            id: id.to_string(),
            name: id.to_string(),
            base_url: format!("https://{}.example", id),
            health_check_path: "/health".to_string(),
            priority,
            enabled: true,
            mode: NodeMode::Sync,
            model: "test/model".to_string(),
            api_key_env: "TEST_KEY".to_string(),
        },
        Some("key".to_string()),
    )
}

/// Probe-only backend: a fixed latency, or a failing probe.
struct ProbeBackend {
    latency: Option<Duration>,
    probes: Arc<AtomicU32>,
}

#[async_trait]
impl GenerationBackend for ProbeBackend {
    fn node_id(&self) -> &str {
        "probe-only"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        Err(ClientError::Validation("not under test".into()))
    }

    async fn probe(&self) -> Result<Duration> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.latency
            .ok_or_else(|| ClientError::Network("probe refused".into()))
    }
}

struct Fixture {
    tracker: HealthTracker,
    probes: Arc<AtomicU32>,
}

fn fixture(plan: Vec<(Node, Option<Duration>)>, ttl: Duration) -> Fixture {
    let probes = Arc::new(AtomicU32::new(0));
    let entries = plan
        .into_iter()
        .map(|(node, latency)| {
            TrackedNode::new(
                node,
                Arc::new(ProbeBackend {
                    latency,
                    probes: probes.clone(),
                }),
            )
        })
        .collect();

    Fixture {
        tracker: HealthTracker::new(entries, ttl),
        probes,
    }
}

const LONG_TTL: Duration = Duration::from_secs(300);

#[tokio::test]
async fn probe_all_records_latency_and_failures() {
    let f = fixture(
        vec![
            (node("up", 1), Some(Duration::from_millis(40))),
            (node("down", 2), None),
        ],
        LONG_TTL,
    );

    f.tracker.probe_all().await;

    let up = f.tracker.get("up").unwrap();
    assert!(up.is_available);
    assert_eq!(up.latency, Some(Duration::from_millis(40)));
    assert_eq!(up.consecutive_failures, 0);

    let down = f.tracker.get("down").unwrap();
    assert!(!down.is_available);
    assert_eq!(down.latency, None);
    assert_eq!(down.consecutive_failures, 1);
}

#[tokio::test]
async fn repeated_probe_failures_accumulate() {
    let f = fixture(vec![(node("down", 1), None)], LONG_TTL);

    f.tracker.probe_all().await;
    f.tracker.probe_all().await;
    f.tracker.probe_all().await;

    assert_eq!(f.tracker.get("down").unwrap().consecutive_failures, 3);
}

#[tokio::test]
async fn successful_probe_resets_failure_count() {
    let f = fixture(
        vec![(node("flaky", 1), Some(Duration::from_millis(10)))],
        LONG_TTL,
    );

    f.tracker.mark_failed("flaky");
    f.tracker.mark_failed("flaky");
    assert_eq!(f.tracker.get("flaky").unwrap().consecutive_failures, 2);

    f.tracker.probe_all().await;
    let health = f.tracker.get("flaky").unwrap();
    assert_eq!(health.consecutive_failures, 0);
    assert!(health.is_available);
}

#[tokio::test]
async fn priority_strategy_prefers_lowest_priority_number() {
    let f = fixture(
        vec![
            (node("backup", 2), Some(Duration::from_millis(5))),
            (node("primary", 1), Some(Duration::from_millis(80))),
        ],
        LONG_TTL,
    );

    let chosen = f.tracker.select_node(SelectionStrategy::Priority).await.unwrap();
    assert_eq!(chosen.id(), "primary");
}

#[tokio::test]
async fn latency_strategy_prefers_fastest_node() {
    let f = fixture(
        vec![
            (node("slow-primary", 1), Some(Duration::from_millis(80))),
            (node("fast-backup", 2), Some(Duration::from_millis(5))),
        ],
        LONG_TTL,
    );

    let chosen = f.tracker.select_node(SelectionStrategy::Latency).await.unwrap();
    assert_eq!(chosen.id(), "fast-backup");
}

#[tokio::test]
async fn round_robin_cycles_through_healthy_nodes() {
    let f = fixture(
        vec![
            (node("a", 1), Some(Duration::from_millis(10))),
            (node("b", 2), Some(Duration::from_millis(10))),
        ],
        LONG_TTL,
    );

    let mut picks = Vec::new();
    for _ in 0..4 {
        picks.push(
            f.tracker
                .select_node(SelectionStrategy::RoundRobin)
                .await
                .unwrap()
                .id()
                .to_string(),
        );
    }
    assert_eq!(picks, vec!["a", "b", "a", "b"]);
}

#[tokio::test]
async fn unhealthy_node_is_excluded_from_advisory_selection() {
    let f = fixture(
        vec![
            (node("primary", 1), Some(Duration::from_millis(10))),
            (node("backup", 2), Some(Duration::from_millis(10))),
        ],
        LONG_TTL,
    );

    f.tracker.probe_all().await;
    f.tracker.mark_failed("primary");

    let chosen = f.tracker.select_node(SelectionStrategy::Priority).await.unwrap();
    assert_eq!(chosen.id(), "backup");
}

#[tokio::test]
async fn all_unhealthy_falls_back_to_highest_priority_node() {
    let f = fixture(vec![(node("b", 2), None), (node("a", 1), None)], LONG_TTL);

    let chosen = f.tracker.select_node(SelectionStrategy::Priority).await.unwrap();
    assert_eq!(chosen.id(), "a");
}

#[tokio::test]
async fn stale_cache_forces_a_reprobe_before_latency_selection() {
    let ttl = Duration::from_millis(20);
    let f = fixture(
        vec![
            (node("a", 1), Some(Duration::from_millis(10))),
            (node("b", 2), Some(Duration::from_millis(10))),
        ],
        ttl,
    );

    f.tracker.select_node(SelectionStrategy::Latency).await.unwrap();
    assert_eq!(f.probes.load(Ordering::SeqCst), 2);

    // Fresh cache: no extra probes.
    f.tracker.select_node(SelectionStrategy::Latency).await.unwrap();
    assert_eq!(f.probes.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_millis(40)).await;
    f.tracker.select_node(SelectionStrategy::Latency).await.unwrap();
    assert_eq!(f.probes.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn reset_discards_cached_state_and_cursor() {
    let f = fixture(
        vec![
            (node("a", 1), Some(Duration::from_millis(10))),
            (node("b", 2), Some(Duration::from_millis(10))),
        ],
        LONG_TTL,
    );

    let first = f
        .tracker
        .select_node(SelectionStrategy::RoundRobin)
        .await
        .unwrap();
    assert_eq!(first.id(), "a");
    f.tracker.reset();
    assert!(f.tracker.all().is_empty());

    let after_reset = f
        .tracker
        .select_node(SelectionStrategy::RoundRobin)
        .await
        .unwrap();
    assert_eq!(after_reset.id(), "a");
}

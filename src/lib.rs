//! Resilient Image Generation Client
//!
//! Turns a sketch plus a style description into a generated-image URL by
//! calling one of several interchangeable backend nodes, failing over
//! automatically when a node is slow, rate-limited, or down.

pub mod backend;
pub mod config;
pub mod error;
pub mod failover;
pub mod health;
pub mod prompt;
pub mod registry;
pub mod retry;
pub mod sketch;
pub mod upload;

pub use error::{ClientError, Result};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use backend::factory::build_backend;
use backend::traits::GenerationRequest;
use config::{SelectionStrategy, Settings};
use failover::{FailoverOrchestrator, FailoverOutcome};
use health::{HealthTracker, TrackedNode};
use registry::{Node, NodeRegistry};
use upload::SketchUploader;

/// One completed generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub id: Uuid,
    pub image_url: String,
    /// Node that produced the image
    pub node_id: String,
    pub created_at: DateTime<Utc>,
}

/// The client facade: registry, health tracker, and failover
/// orchestrator wired together from settings.
pub struct SketchGenClient {
    settings: Settings,
    registry: Arc<NodeRegistry>,
    health: Arc<HealthTracker>,
    orchestrator: FailoverOrchestrator,
}

impl SketchGenClient {
    /// Build a client without an upload collaborator. Async-job nodes
    /// will fail fast at request time if they are attempted.
    pub fn new(settings: Settings) -> Result<Self> {
        Self::with_uploader(settings, None)
    }

    /// Build a client, injecting the sketch uploader async-job nodes need.
    pub fn with_uploader(
        settings: Settings,
        uploader: Option<Arc<dyn SketchUploader>>,
    ) -> Result<Self> {
        settings.validate()?;
        let registry = Arc::new(NodeRegistry::from_settings(&settings));

        let mut candidates = Vec::new();
        let mut tracked = Vec::new();
        for node in registry.enabled_by_priority() {
            let backend = build_backend(node, &settings, uploader.clone())?;
            candidates.push((node.clone(), backend.clone()));
            tracked.push(TrackedNode::new(node.clone(), backend));
        }

        let health = Arc::new(HealthTracker::new(
            tracked,
            Duration::from_millis(settings.probe.cache_ttl_ms),
        ));
        let orchestrator = FailoverOrchestrator::new(candidates, health.clone());

        Ok(Self {
            settings,
            registry,
            health,
            orchestrator,
        })
    }

    /// Eagerly probe all nodes so the first request starts with a warm
    /// health cache. Probe failures are recorded, never fatal.
    pub async fn warm_up(&self) {
        self.health.probe_all().await;
        info!(
            nodes = self.registry.enabled_by_priority().len(),
            "Node health cache warmed up"
        );
    }

    /// Generate an image from a sketch.
    ///
    /// The style prompt and optional user prompt are composed into the
    /// final prompt; the cancellation token threads through retries and
    /// poll loops and aborts the whole operation when fired.
    pub async fn generate(
        &self,
        sketch_data_url: &str,
        style_prompt: &str,
        user_prompt: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<GenerationOutcome> {
        sketch::validate_sketch(sketch_data_url)?;

        let final_prompt = prompt::build_final_prompt(style_prompt, user_prompt);
        let request = GenerationRequest::new(sketch_data_url, final_prompt).with_cancel(cancel);

        let FailoverOutcome { image_url, node_id } =
            self.orchestrator.generate_with_fallback(&request).await?;

        Ok(GenerationOutcome {
            id: Uuid::new_v4(),
            image_url,
            node_id,
            created_at: Utc::now(),
        })
    }

    /// Advisory: the single best node by the configured strategy.
    ///
    /// Note this is not what failover uses; the failover loop walks all
    /// enabled nodes by static priority regardless of advisory health.
    pub async fn best_node(&self) -> Result<Node> {
        self.health.select_node(self.settings.strategy).await
    }

    /// Advisory selection with an explicit strategy.
    pub async fn best_node_by(&self, strategy: SelectionStrategy) -> Result<Node> {
        self.health.select_node(strategy).await
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

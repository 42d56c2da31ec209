//! Sequential failover across candidate nodes
//!
//! Tries every enabled node in ascending priority order until one
//! produces an image. Candidates come straight from the registry, not
//! from advisory selection: a node circuit-broken out of `select_node`
//! still gets its chance here, because health influences preference,
//! never eligibility, on this path.

use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::traits::{GenerationBackend, GenerationRequest};
use crate::error::{ClientError, Result};
use crate::health::HealthTracker;
use crate::registry::Node;

/// How the orchestrator walks its candidate list.
///
/// Generation calls are paid and rate-limited, so candidates are tried
/// one at a time and never raced in parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailoverPolicy {
    #[default]
    Sequential,
}

/// Output of a successful failover run.
#[derive(Debug, Clone)]
pub struct FailoverOutcome {
    pub image_url: String,
    pub node_id: String,
}

/// Walks candidate nodes in order, recording failures in the health
/// tracker as it goes.
pub struct FailoverOrchestrator {
    candidates: Vec<(Node, Arc<dyn GenerationBackend>)>,
    health: Arc<HealthTracker>,
    policy: FailoverPolicy,
}

impl FailoverOrchestrator {
    /// `candidates` must already be the enabled nodes in ascending
    /// priority order, each paired with its adapter.
    pub fn new(
        candidates: Vec<(Node, Arc<dyn GenerationBackend>)>,
        health: Arc<HealthTracker>,
    ) -> Self {
        Self {
            candidates,
            health,
            policy: FailoverPolicy::default(),
        }
    }

    pub fn policy(&self) -> FailoverPolicy {
        self.policy
    }

    /// Try each candidate until one succeeds.
    ///
    /// Success returns immediately; the winner's health record is left
    /// untouched. A user cancellation is terminal for the whole
    /// operation and never advances to the next node. Exhaustion
    /// surfaces the last error seen.
    pub async fn generate_with_fallback(
        &self,
        request: &GenerationRequest,
    ) -> Result<FailoverOutcome> {
        match self.policy {
            FailoverPolicy::Sequential => {}
        }

        let mut last_error: Option<ClientError> = None;

        for (node, backend) in &self.candidates {
            if request.cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            match backend.generate(request).await {
                Ok(image_url) => {
                    info!(node = %node.id(), "Generation succeeded");
                    return Ok(FailoverOutcome {
                        image_url,
                        node_id: node.id().to_string(),
                    });
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    warn!(node = %node.id(), "Node failed, trying next: {}", err);
                    self.health.mark_failed(node.id());
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ClientError::Validation("No enabled nodes available".to_string())
        }))
    }
}

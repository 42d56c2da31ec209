//! Backend module - adapter trait, the two concrete adapters, and the factory

pub mod chat;
pub mod factory;
pub mod job;
pub mod traits;

use std::time::{Duration, Instant};

use crate::error::{ClientError, Result};
use crate::registry::Node;

/// Authenticated GET against the node's health-check path, bounded by
/// `timeout`. Any 2xx means healthy; the body is ignored. Both adapters
/// probe the same way.
pub(crate) async fn measure_probe(
    client: &reqwest::Client,
    node: &Node,
    timeout: Duration,
) -> Result<Duration> {
    let api_key = node
        .api_key()
        .ok_or_else(|| ClientError::Validation(format!("Node '{}' has no credential", node.id())))?;

    let url = format!("{}{}", node.base_url(), node.health_check_path());
    let started = Instant::now();

    let response = tokio::time::timeout(timeout, client.get(&url).bearer_auth(api_key).send())
        .await
        .map_err(|_| {
            ClientError::Network(format!("Health check timed out after {:?}", timeout))
        })?
        .map_err(|e| ClientError::Network(format!("Health check failed: {}", e)))?;

    if response.status().is_success() {
        Ok(started.elapsed())
    } else {
        Err(ClientError::api(
            format!("Health check returned {}", response.status()),
            Some(response.status().as_u16()),
        ))
    }
}

//! Application settings and configuration management

use crate::error::{ClientError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub strategy: SelectionStrategy,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_nodes")]
    pub nodes: Vec<NodeConfig>,
}

/// Strategy used by advisory node selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    /// Ascending priority number (lower = preferred)
    #[default]
    Priority,
    /// Ascending cached latency, unknown treated as infinite
    Latency,
    /// Cyclic index over the healthy set
    RoundRobin,
}

/// Health probe configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    /// Per-probe timeout
    #[serde(default = "default_probe_timeout")]
    pub timeout_ms: u64,
    /// How long probe results stay fresh
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_ms: u64,
}

fn default_probe_timeout() -> u64 {
    5_000
}

fn default_cache_ttl() -> u64 {
    5 * 60 * 1000
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_probe_timeout(),
            cache_ttl_ms: default_cache_ttl(),
        }
    }
}

/// Retry configuration for the synchronous generation path
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay() -> u64 {
    1_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay(),
        }
    }
}

/// Polling configuration for the asynchronous job path
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollConfig {
    /// Delay before the first status query
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// Delay between status queries
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    /// Overall bound on time spent polling one task
    #[serde(default = "default_poll_timeout")]
    pub max_timeout_ms: u64,
}

fn default_initial_delay() -> u64 {
    2_000
}

fn default_poll_interval() -> u64 {
    3_000
}

fn default_poll_timeout() -> u64 {
    60_000
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            interval_ms: default_poll_interval(),
            max_timeout_ms: default_poll_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60_000
}

/// Request shape a node speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeMode {
    /// One chat-completions call returns the image
    Sync,
    /// Create a task, then poll it to completion
    AsyncJob,
}

/// One candidate backend node
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    pub id: String,
    pub name: String,
    pub base_url: String,
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,
    /// Lower number = preferred
    pub priority: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub mode: NodeMode,
    pub model: String,
    /// Environment variable holding the bearer token for this node
    pub api_key_env: String,
}

fn default_health_check_path() -> String {
    "/health".to_string()
}

fn default_true() -> bool {
    true
}

/// The deployment this client was built for: a primary async-job node
/// and a synchronous chat-completions fallback.
fn default_nodes() -> Vec<NodeConfig> {
    vec![
        NodeConfig {
            id: "kie".to_string(),
            name: "kie.ai".to_string(),
            base_url: "https://api.kie.ai/api/v1".to_string(),
            health_check_path: "/chat/credit".to_string(),
            priority: 1,
            enabled: true,
            mode: NodeMode::AsyncJob,
            model: "google/nano-banana-edit".to_string(),
            api_key_env: "KIE_API_KEY".to_string(),
        },
        NodeConfig {
            id: "openrouter".to_string(),
            name: "OpenRouter".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            health_check_path: "/credits".to_string(),
            priority: 2,
            enabled: true,
            mode: NodeMode::Sync,
            model: "google/gemini-2.5-flash-image".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
        },
    ]
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            // Load from configuration file
            .add_source(
                File::with_name(path.as_ref().to_str().unwrap_or("config/default"))
                    .required(false),
            )
            // Override with environment variables (prefixed with SKETCHGEN__)
            .add_source(
                Environment::with_prefix("SKETCHGEN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            if node.id.is_empty() {
                return Err(ClientError::Validation(
                    "Node id cannot be empty".to_string(),
                ));
            }
            if node.base_url.is_empty() {
                return Err(ClientError::Validation(format!(
                    "Node '{}' must have a base URL",
                    node.id
                )));
            }
            if node.api_key_env.is_empty() {
                return Err(ClientError::Validation(format!(
                    "Node '{}' must name its credential environment variable",
                    node.id
                )));
            }
        }

        let mut ids: Vec<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.nodes.len() {
            return Err(ClientError::Validation(
                "Node ids must be unique".to_string(),
            ));
        }

        if self.retry.backoff_factor < 1.0 {
            return Err(ClientError::Validation(
                "retry.backoff_factor must be at least 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::default(),
            probe: ProbeConfig::default(),
            retry: RetryConfig::default(),
            poll: PollConfig::default(),
            request_timeout_ms: default_request_timeout(),
            nodes: default_nodes(),
        }
    }
}

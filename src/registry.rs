//! Static registry of candidate backend nodes
//!
//! Built once at startup from [`Settings`]; never mutated afterwards.
//! A node whose credential environment variable is unset is registered
//! as disabled rather than failing at request time.

use tracing::{debug, warn};

use crate::config::{NodeConfig, NodeMode, Settings};

/// One configured backend node with its resolved credential.
#[derive(Debug, Clone)]
pub struct Node {
    config: NodeConfig,
    api_key: Option<String>,
    enabled: bool,
}

impl Node {
    /// Build a node, resolving enablement from config and credential.
    pub fn new(config: NodeConfig, api_key: Option<String>) -> Self {
        let has_key = api_key.as_deref().map_or(false, |k| !k.is_empty());
        let enabled = config.enabled && has_key;
        Self {
            config,
            api_key: api_key.filter(|k| !k.is_empty()),
            enabled,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn health_check_path(&self) -> &str {
        &self.config.health_check_path
    }

    pub fn priority(&self) -> u32 {
        self.config.priority
    }

    pub fn mode(&self) -> NodeMode {
        self.config.mode
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Immutable lookup over all configured nodes.
pub struct NodeRegistry {
    nodes: Vec<Node>,
}

impl NodeRegistry {
    /// Build the registry from settings, resolving each node's bearer
    /// token from its configured environment variable.
    pub fn from_settings(settings: &Settings) -> Self {
        let nodes = settings
            .nodes
            .iter()
            .map(|config| {
                let api_key = std::env::var(&config.api_key_env).ok();
                let node = Node::new(config.clone(), api_key);
                if config.enabled && !node.is_enabled() {
                    warn!(
                        node = %config.id,
                        env = %config.api_key_env,
                        "Node disabled: credential environment variable not set"
                    );
                } else {
                    debug!(
                        node = %config.id,
                        enabled = node.is_enabled(),
                        priority = config.priority,
                        "Registered node"
                    );
                }
                node
            })
            .collect();

        Self { nodes }
    }

    /// Build a registry directly from resolved nodes.
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// All configured nodes, enabled or not.
    pub fn all(&self) -> &[Node] {
        &self.nodes
    }

    /// Enabled nodes sorted ascending by priority. Disabled nodes are
    /// excluded unconditionally.
    pub fn enabled_by_priority(&self) -> Vec<&Node> {
        let mut enabled: Vec<&Node> = self.nodes.iter().filter(|n| n.is_enabled()).collect();
        enabled.sort_by_key(|n| n.priority());
        enabled
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeMode;

    fn node_config(id: &str, priority: u32, env: &str) -> NodeConfig {
        NodeConfig {
            id: id.to_string(),
            name: id.to_string(),
            base_url: format!("https://{}.example", id),
            health_check_path: "/health".to_string(),
            priority,
            enabled: true,
            mode: NodeMode::Sync,
            model: "test/model".to_string(),
            api_key_env: env.to_string(),
        }
    }

    #[test]
    fn test_missing_credential_disables_node() {
        let node = Node::new(node_config("a", 1, "UNSET"), None);
        assert!(!node.is_enabled());

        let node = Node::new(node_config("a", 1, "EMPTY"), Some(String::new()));
        assert!(!node.is_enabled());
    }

    #[test]
    fn test_explicit_disable_wins_over_credential() {
        let mut config = node_config("a", 1, "SET");
        config.enabled = false;
        let node = Node::new(config, Some("key".to_string()));
        assert!(!node.is_enabled());
    }

    #[test]
    fn test_enabled_by_priority_sorted_and_filtered() {
        let registry = NodeRegistry::new(vec![
            Node::new(node_config("backup", 2, "K"), Some("k".to_string())),
            Node::new(node_config("dead", 1, "K"), None),
            Node::new(node_config("primary", 1, "K"), Some("k".to_string())),
        ]);

        let enabled = registry.enabled_by_priority();
        let ids: Vec<&str> = enabled.iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec!["primary", "backup"]);
    }

    #[test]
    fn test_from_settings_resolves_env() {
        std::env::set_var("SKETCHGEN_TEST_REGISTRY_KEY", "secret");
        let mut settings = crate::config::Settings::default();
        settings.nodes = vec![node_config("env-node", 1, "SKETCHGEN_TEST_REGISTRY_KEY")];

        let registry = NodeRegistry::from_settings(&settings);
        let node = registry.get("env-node").unwrap();
        assert!(node.is_enabled());
        assert_eq!(node.api_key(), Some("secret"));
        std::env::remove_var("SKETCHGEN_TEST_REGISTRY_KEY");
    }
}

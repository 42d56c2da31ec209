//! Configuration module - settings, node definitions, defaults

pub mod settings;

pub use settings::{
    NodeConfig, NodeMode, PollConfig, ProbeConfig, RetryConfig, SelectionStrategy, Settings,
};

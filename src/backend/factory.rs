//! Mode-keyed adapter construction
//!
//! The node's declared mode picks the concrete adapter once, here;
//! nothing downstream inspects which shape a node speaks. A third
//! backend shape is a new variant of [`NodeMode`] plus a new arm, not a
//! branch scattered through call sites.

use std::sync::Arc;

use crate::backend::chat::ChatBackend;
use crate::backend::job::JobBackend;
use crate::backend::traits::GenerationBackend;
use crate::config::{NodeMode, Settings};
use crate::error::Result;
use crate::registry::Node;
use crate::upload::SketchUploader;

/// Build the adapter for one node.
pub fn build_backend(
    node: &Node,
    settings: &Settings,
    uploader: Option<Arc<dyn SketchUploader>>,
) -> Result<Arc<dyn GenerationBackend>> {
    let backend: Arc<dyn GenerationBackend> = match node.mode() {
        NodeMode::Sync => Arc::new(ChatBackend::new(node.clone(), settings)?),
        NodeMode::AsyncJob => Arc::new(JobBackend::new(node.clone(), settings, uploader)?),
    };
    Ok(backend)
}

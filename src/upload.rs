//! Sketch upload collaborator interface
//!
//! Job-queue backends require the sketch at a publicly reachable URL;
//! hosting it is someone else's concern. Implementations are injected at
//! client construction, and their absence is a configuration error
//! surfaced fast by the job adapter.

use async_trait::async_trait;

use crate::error::Result;

/// Turns a sketch data URL into a publicly reachable image URL.
#[async_trait]
pub trait SketchUploader: Send + Sync {
    async fn upload(&self, sketch_data_url: &str) -> Result<String>;
}

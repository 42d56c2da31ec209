//! Common traits and types for generation backends

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// One image generation request, immutable for the duration of the call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Base64 data URL of the sketch
    pub sketch_data_url: String,

    /// Fully composed prompt text
    pub final_prompt: String,

    /// Cancellation signal threaded through retries and poll loops
    pub cancel: CancellationToken,
}

impl GenerationRequest {
    pub fn new(sketch_data_url: impl Into<String>, final_prompt: impl Into<String>) -> Self {
        Self {
            sketch_data_url: sketch_data_url.into(),
            final_prompt: final_prompt.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Uniform client over one node's request/response shape.
///
/// Exactly two implementations exist: the synchronous chat adapter and
/// the asynchronous job adapter. The factory picks one from the node's
/// declared mode; call sites never inspect the concrete type.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Id of the node this adapter speaks for
    fn node_id(&self) -> &str;

    /// Generate one image, returning its URL (or data URL)
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Lightweight authenticated health check, returning round-trip latency
    async fn probe(&self) -> Result<Duration>;
}

//! Synchronous chat-completions adapter
//!
//! One multi-modal POST carries the sketch and the composed prompt; the
//! generated image comes back in the same response. Transient failures
//! (5xx, 429, timeouts, connection errors) are retried through the retry
//! executor; everything else fails the node immediately.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::traits::{GenerationBackend, GenerationRequest};
use crate::config::Settings;
use crate::error::{ClientError, Result};
use crate::registry::Node;
use crate::retry::{with_retry, RetryPolicy};

const MAX_TOKENS: u32 = 4_096;
const TEMPERATURE: f32 = 1.2;

/// Extensions accepted when fishing an image URL out of plain text.
const IMAGE_EXTENSIONS: [&str; 5] = [".png", ".jpg", ".jpeg", ".webp", ".gif"];

/// How much unparsed text to quote in a no-image error.
const PREVIEW_CHARS: usize = 100;

/// Adapter for nodes that answer a single chat-completions call.
pub struct ChatBackend {
    node: Node,
    client: Client,
    retry: RetryPolicy,
    request_timeout: Duration,
    probe_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    modalities: Vec<&'static str>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    ImageUrl { image_url: ImageUrlPayload },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct ImageUrlPayload {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<MessageContent>,
    #[serde(default)]
    images: Vec<ResponseImage>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPartIn>),
}

#[derive(Debug, Deserialize)]
struct ContentPartIn {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    image_url: Option<ImageUrlRef>,
}

#[derive(Debug, Deserialize)]
struct ResponseImage {
    #[serde(default)]
    image_url: Option<ImageUrlRef>,
}

#[derive(Debug, Deserialize)]
struct ImageUrlRef {
    url: String,
}

impl ChatBackend {
    pub fn new(node: Node, settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ClientError::Validation(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            node,
            client,
            retry: RetryPolicy::from(&settings.retry),
            request_timeout: Duration::from_millis(settings.request_timeout_ms),
            probe_timeout: Duration::from_millis(settings.probe.timeout_ms),
        })
    }

    fn build_request(&self, request: &GenerationRequest) -> ChatCompletionsRequest {
        ChatCompletionsRequest {
            model: self.node.model().to_string(),
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::ImageUrl {
                        image_url: ImageUrlPayload {
                            url: request.sketch_data_url.clone(),
                            detail: "auto",
                        },
                    },
                    ContentPart::Text {
                        text: request.final_prompt.clone(),
                    },
                ],
            }],
            modalities: vec!["image", "text"],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            stream: false,
        }
    }

    /// One attempt: POST, classify the status, extract the image.
    ///
    /// The request-level timeout is independent of user cancellation and
    /// maps to a retryable network error; a fired cancellation token wins
    /// over everything and is never retried.
    async fn send_once(
        &self,
        body: &ChatCompletionsRequest,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let api_key = self.node.api_key().ok_or_else(|| {
            ClientError::Validation(format!("Node '{}' has no credential", self.node.id()))
        })?;

        let url = format!("{}/chat/completions", self.node.base_url());
        debug!(node = %self.node.id(), model = %self.node.model(), "Sending generation request");

        let send = self.client.post(&url).bearer_auth(api_key).json(body).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            outcome = tokio::time::timeout(self.request_timeout, send) => match outcome {
                Err(_) => {
                    return Err(ClientError::Network(format!(
                        "Request timed out after {:?}",
                        self.request_timeout
                    )))
                }
                Ok(Err(e)) => return Err(ClientError::Network(format!("Request failed: {}", e))),
                Ok(Ok(response)) => response,
            },
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if status.as_u16() >= 500 || status.as_u16() == 429 {
                return Err(ClientError::Network(format!(
                    "Server error {}: {}",
                    status,
                    preview(&text)
                )));
            }
            return Err(ClientError::api(
                format!("Generation failed with {}: {}", status, preview(&text)),
                Some(status.as_u16()),
            ));
        }

        let payload: ChatCompletionsResponse = response.json().await.map_err(|e| {
            ClientError::api(format!("Failed to parse response: {}", e), Some(status.as_u16()))
        })?;

        if let Some(error) = payload.error {
            return Err(ClientError::api(
                format!("Generation error: {}", error.message),
                None,
            ));
        }

        extract_image_reference(&payload)
    }
}

#[async_trait]
impl GenerationBackend for ChatBackend {
    fn node_id(&self) -> &str {
        self.node.id()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = self.build_request(request);

        with_retry(
            || self.send_once(&body, &request.cancel),
            &self.retry,
            &request.cancel,
            |err| err.is_retryable(),
            |attempt, delay, err| {
                warn!(
                    node = %self.node.id(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying generation after error: {}",
                    err
                );
            },
        )
        .await
    }

    async fn probe(&self) -> Result<Duration> {
        crate::backend::measure_probe(&self.client, &self.node, self.probe_timeout).await
    }
}

/// Pull the generated image reference out of a successful response.
///
/// Tried in order: the structured `images` list, an image entry in a
/// multi-part content array, then plain text (literal URL or data-URI
/// prefix, markdown image link, embedded image URL, embedded data URI).
fn extract_image_reference(response: &ChatCompletionsResponse) -> Result<String> {
    let message = response
        .choices
        .first()
        .and_then(|c| c.message.as_ref())
        .ok_or_else(|| ClientError::api("Response carried no message", None))?;

    if let Some(url) = message
        .images
        .iter()
        .find_map(|img| img.image_url.as_ref().map(|r| r.url.clone()))
    {
        return Ok(url);
    }

    match &message.content {
        Some(MessageContent::Parts(parts)) => parts
            .iter()
            .find(|p| p.kind == "image_url")
            .and_then(|p| p.image_url.as_ref().map(|r| r.url.clone()))
            .ok_or_else(|| ClientError::api("No image found in multi-part response content", None)),
        Some(MessageContent::Text(text)) => extract_from_text(text.trim()),
        None => Err(ClientError::api("No image found in response", None)),
    }
}

fn extract_from_text(text: &str) -> Result<String> {
    if text.starts_with("http") || text.starts_with("data:image") {
        return Ok(text.to_string());
    }
    if let Some(url) = extract_markdown_image(text) {
        return Ok(url);
    }
    if let Some(url) = scan_image_url(text) {
        return Ok(url);
    }
    if let Some(uri) = scan_data_uri(text) {
        return Ok(uri);
    }

    Err(ClientError::api(
        format!(
            "Model returned text without an image. Preview: {}...",
            preview(text)
        ),
        None,
    ))
}

/// Markdown image syntax: `![alt](url)`
fn extract_markdown_image(text: &str) -> Option<String> {
    let bang = text.find("![")?;
    let rest = &text[bang..];
    let open = rest.find("](")?;
    let after = &rest[open + 2..];
    let close = after.find(')')?;
    let url = after[..close].trim();
    (!url.is_empty()).then(|| url.to_string())
}

/// First http(s) URL that ends in a known image extension.
fn scan_image_url(text: &str) -> Option<String> {
    for (start, _) in text.match_indices("http") {
        let candidate = &text[start..];
        if !candidate.starts_with("http://") && !candidate.starts_with("https://") {
            continue;
        }

        let end = candidate
            .find(|c: char| c.is_whitespace() || c == '"' || c == '\'')
            .unwrap_or(candidate.len());
        let token = &candidate[..end];
        let lower = token.to_ascii_lowercase();

        // Trim anything after the last recognized extension (punctuation,
        // closing brackets).
        let cut = IMAGE_EXTENSIONS
            .iter()
            .filter_map(|ext| lower.rfind(ext).map(|pos| pos + ext.len()))
            .max();
        if let Some(cut) = cut {
            return Some(token[..cut].to_string());
        }
    }
    None
}

/// First embedded base64 image data URI.
fn scan_data_uri(text: &str) -> Option<String> {
    let start = text.find("data:image/")?;
    let candidate = &text[start..];
    let end = candidate
        .find(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == ')')
        .unwrap_or(candidate.len());
    let token = &candidate[..end];
    token.contains(";base64,").then(|| token.to_string())
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

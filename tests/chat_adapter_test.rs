//! HTTP-level tests for the synchronous chat adapter

use std::time::Duration;

use serde_json::json;
use sketchgen_client::backend::chat::ChatBackend;
use sketchgen_client::backend::traits::{GenerationBackend, GenerationRequest};
use sketchgen_client::config::{NodeConfig, NodeMode, Settings};
use sketchgen_client::error::ClientError;
use sketchgen_client::registry::Node;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn node(base_url: &str) -> Node {
    Node::new(
        NodeConfig {
            id: "chat".to_string(),
            name: "Chat".to_string(),
            base_url: base_url.to_string(),
            health_check_path: "/credits".to_string(),
            priority: 1,
            enabled: true,
            mode: NodeMode::Sync,
            model: "test/image-model".to_string(),
            api_key_env: "TEST_KEY".to_string(),
        },
        Some("test-key".to_string()),
    )
}

fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.retry.base_delay_ms = 10;
    settings.retry.max_delay_ms = 50;
    settings.request_timeout_ms = 5_000;
    settings
}

fn request() -> GenerationRequest {
    GenerationRequest::new("data:image/png;base64,aGk=", "Apply style: test")
}

fn success_body(url: &str) -> serde_json::Value {
    json!({
        "choices": [{
            "message": {
                "content": "Here is your image",
                "images": [{"type": "image_url", "image_url": {"url": url}}]
            }
        }]
    })
}

#[tokio::test]
async fn sends_multimodal_request_and_returns_image_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "test/image-model",
            "modalities": ["image", "text"],
            "stream": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("https://img/ok.png")))
        .expect(1)
        .mount(&server)
        .await;

    let backend = ChatBackend::new(node(&server.uri()), &fast_settings()).unwrap();
    let url = backend.generate(&request()).await.unwrap();
    assert_eq!(url, "https://img/ok.png");
}

#[tokio::test]
async fn server_error_is_retried_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("https://img/retry.png")))
        .expect(1)
        .mount(&server)
        .await;

    let backend = ChatBackend::new(node(&server.uri()), &fast_settings()).unwrap();
    let url = backend.generate(&request()).await.unwrap();
    assert_eq!(url, "https://img/retry.png");
}

#[tokio::test]
async fn rate_limit_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("https://img/ok.png")))
        .expect(1)
        .mount(&server)
        .await;

    let backend = ChatBackend::new(node(&server.uri()), &fast_settings()).unwrap();
    assert!(backend.generate(&request()).await.is_ok());
}

#[tokio::test]
async fn persistent_server_error_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3) // max_retries = 2 means exactly 3 invocations
        .mount(&server)
        .await;

    let backend = ChatBackend::new(node(&server.uri()), &fast_settings()).unwrap();
    let err = backend.generate(&request()).await.unwrap_err();
    assert!(matches!(err, ClientError::Network(_)));
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad model"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = ChatBackend::new(node(&server.uri()), &fast_settings()).unwrap();
    let err = backend.generate(&request()).await.unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, Some(400));
            assert!(message.contains("bad model"));
        }
        other => panic!("expected Api error, got {:?}", other),
    }
}

#[tokio::test]
async fn error_field_in_success_body_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"error": {"message": "model overloaded"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let backend = ChatBackend::new(node(&server.uri()), &fast_settings()).unwrap();
    let err = backend.generate(&request()).await.unwrap_err();
    match err {
        ClientError::Api { message, .. } => assert!(message.contains("model overloaded")),
        other => panic!("expected Api error, got {:?}", other),
    }
}

#[tokio::test]
async fn refusal_text_yields_api_error_with_preview() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "I am unable to generate that image."}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = ChatBackend::new(node(&server.uri()), &fast_settings()).unwrap();
    let err = backend.generate(&request()).await.unwrap_err();
    match err {
        ClientError::Api { message, .. } => assert!(message.contains("I am unable")),
        other => panic!("expected Api error, got {:?}", other),
    }
}

#[tokio::test]
async fn request_timeout_is_classified_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(success_body("https://img/late.png"))
                .set_delay(Duration::from_secs(5)),
        )
        .expect(2) // one retry after the first timeout
        .mount(&server)
        .await;

    let mut settings = fast_settings();
    settings.request_timeout_ms = 50;
    settings.retry.max_retries = 1;

    let backend = ChatBackend::new(node(&server.uri()), &settings).unwrap();
    let err = backend.generate(&request()).await.unwrap_err();
    assert!(matches!(err, ClientError::Network(_)));
}

#[tokio::test]
async fn user_cancellation_beats_the_request_and_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(success_body("https://img/late.png"))
                .set_delay(Duration::from_secs(10)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let backend = ChatBackend::new(node(&server.uri()), &fast_settings()).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let err = backend
        .generate(&request().with_cancel(cancel))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Cancelled));
}

#[tokio::test]
async fn probe_measures_latency_on_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/credits"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let backend = ChatBackend::new(node(&server.uri()), &fast_settings()).unwrap();
    let latency = backend.probe().await.unwrap();
    assert!(latency > Duration::ZERO);
}

#[tokio::test]
async fn probe_fails_on_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/credits"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let backend = ChatBackend::new(node(&server.uri()), &fast_settings()).unwrap();
    assert!(backend.probe().await.is_err());
}

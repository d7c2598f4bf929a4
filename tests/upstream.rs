use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use llm_gateway::config::BackendConfig;
use llm_gateway::relay::RelayRequest;
use llm_gateway::streaming::ndjson_to_sse;
use llm_gateway::types::{ChatMessage, CompletionRequest, GenerationOptions, Usage};
use llm_gateway::upstream::{InferenceBackend, OllamaClient, OpenLlmClient};
use llm_gateway::{build_router, AppConfig, AppState};

/// Serves `app` on an ephemeral loopback port and returns its base URL.
async fn spawn(app: Router) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap();
    });
    format!("http://{addr}")
}

fn last_content(body: &Value) -> String {
    body["messages"]
        .as_array()
        .and_then(|m| m.last())
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string()
}

async fn ollama_chat(Json(body): Json<Value>) -> impl IntoResponse {
    let content = format!(
        "{}|{}",
        last_content(&body),
        body["options"]["num_predict"]
    );
    if body["stream"] == true {
        let lines = [
            json!({ "message": { "role": "assistant", "content": "Hel" }, "done": false }),
            json!({ "message": { "role": "assistant", "content": "lo" }, "done": false }),
            json!({ "message": { "role": "assistant", "content": "" }, "done": true }),
        ]
        .iter()
        .map(|l| format!("{l}\n"))
        .collect::<String>();
        return ([(header::CONTENT_TYPE, "application/x-ndjson")], lines).into_response();
    }
    Json(json!({
        "model": body["model"],
        "message": { "role": "assistant", "content": content },
        "done": true,
        "prompt_eval_count": 5,
        "eval_count": 7
    }))
    .into_response()
}

async fn ollama_generate(Json(body): Json<Value>) -> impl IntoResponse {
    match body["prompt"].as_str() {
        Some("slow") => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(json!({ "response": "late", "done": true })).into_response()
        }
        _ if body["model"] == "missing" => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "model 'missing' not found" })),
        )
            .into_response(),
        Some(prompt) => Json(json!({ "response": prompt.to_uppercase(), "done": true })).into_response(),
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

fn fake_ollama() -> Router {
    Router::new()
        .route("/api/version", get(|| async { Json(json!({ "version": "0.1.17" })) }))
        .route(
            "/api/tags",
            get(|| async {
                Json(json!({
                    "models": [{
                        "name": "llama2:latest",
                        "size": 3825819519u64,
                        "modified_at": "2023-12-01T10:00:00Z",
                        "digest": "fe938a131f40",
                        "details": { "family": "llama", "parameter_size": "7B" }
                    }]
                }))
            }),
        )
        .route("/api/chat", post(ollama_chat))
        .route("/api/generate", post(ollama_generate))
}

const OPENLLM_STREAM: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";

async fn openllm_chat(Json(body): Json<Value>) -> impl IntoResponse {
    if body["model"] == "busy" {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": { "message": "model is loading" } })),
        )
            .into_response();
    }
    if body["stream"] == true {
        return ([(header::CONTENT_TYPE, "text/event-stream")], OPENLLM_STREAM).into_response();
    }
    Json(json!({
        "id": "cmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": format!("echo: {}", last_content(&body)) },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 2, "completion_tokens": 3, "total_tokens": 5 }
    }))
    .into_response()
}

async fn openllm_complete(Json(body): Json<Value>) -> impl IntoResponse {
    if body["prompt"] == "crash" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "message": "engine crashed", "type": "server_error" } })),
        )
            .into_response();
    }
    Json(json!({
        "choices": [{ "index": 0, "text": format!("max={}", body["max_tokens"]) }],
        "usage": { "prompt_tokens": 4, "completion_tokens": 6 }
    }))
    .into_response()
}

fn fake_openllm() -> Router {
    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route(
            "/v1/models",
            get(|| async {
                Json(json!({
                    "object": "list",
                    "data": [{ "id": "facebook/opt-1.3b", "object": "model", "created": 0, "owned_by": "openllm" }]
                }))
            }),
        )
        .route("/v1/chat/completions", post(openllm_chat))
        .route("/v1/completions", post(openllm_complete))
}

// Nothing listens on the discard port.
const DEAD_URL: &str = "http://127.0.0.1:9";

fn backend(url: &str, model: &str) -> BackendConfig {
    let mut config = BackendConfig::new(url, model);
    config.health_timeout = Duration::from_millis(500);
    config
}

fn chat_request(text: &str) -> CompletionRequest {
    RelayRequest {
        messages: Some(vec![ChatMessage::user(text)]),
        ..Default::default()
    }
    .validate()
    .unwrap()
}

fn prompt_request(prompt: &str, model: Option<&str>) -> CompletionRequest {
    RelayRequest {
        prompt: Some(prompt.to_string()),
        model: model.map(str::to_string),
        ..Default::default()
    }
    .validate()
    .unwrap()
}

async fn collect(stream: impl futures::Stream<Item = Result<bytes::Bytes, std::convert::Infallible>>) -> String {
    let chunks: Vec<_> = stream.collect().await;
    chunks
        .into_iter()
        .map(|c| String::from_utf8(c.unwrap().to_vec()).unwrap())
        .collect()
}

#[tokio::test]
async fn ollama_health_and_models() {
    let url = spawn(fake_ollama()).await;
    let client = OllamaClient::new(backend(&url, "llama2")).unwrap();
    assert!(client.check_health().await);

    let models = client.list_models().await;
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].name, "llama2:latest");
    assert_eq!(models[0].size, Some(3825819519));
    assert_eq!(models[0].digest.as_deref(), Some("fe938a131f40"));
}

#[tokio::test]
async fn unreachable_daemon_degrades_to_values() {
    let client = OllamaClient::new(backend(DEAD_URL, "llama2")).unwrap();
    assert!(!client.check_health().await);
    assert!(client.list_models().await.is_empty());
    assert!(client.complete_stream(&chat_request("hi")).await.is_none());

    let resp = client.complete(&chat_request("hi")).await;
    assert!(!resp.is_success());
    assert!(resp.error().is_some());
    assert_eq!(resp.model(), "llama2");
}

#[tokio::test]
async fn ollama_chat_uses_defaults_and_reports_usage() {
    let url = spawn(fake_ollama()).await;
    let client = OllamaClient::new(backend(&url, "llama2")).unwrap();

    let resp = client.complete(&chat_request("ping")).await;
    assert!(resp.is_success());
    assert_eq!(resp.data(), Some("ping|1024"));
    assert_eq!(resp.usage(), Some(Usage::new(5, 7)));

    let mut request = chat_request("ping");
    request.options = GenerationOptions {
        max_tokens: Some(32),
        ..Default::default()
    };
    let resp = client.complete(&request).await;
    assert_eq!(resp.data(), Some("ping|32"));
}

#[tokio::test]
async fn ollama_generate_errors_and_timeouts() {
    let url = spawn(fake_ollama()).await;
    let mut config = backend(&url, "llama2");
    config.request_timeout = Duration::from_millis(200);
    let client = OllamaClient::new(config).unwrap();

    let resp = client.complete(&prompt_request("shout", None)).await;
    assert_eq!(resp.data(), Some("SHOUT"));

    let resp = client.complete(&prompt_request("shout", Some("missing"))).await;
    assert!(!resp.is_success());
    assert_eq!(resp.error(), Some("model 'missing' not found"));
    assert_eq!(resp.model(), "missing");

    let resp = client.complete(&prompt_request("slow", None)).await;
    assert!(!resp.is_success());
}

#[tokio::test]
async fn ollama_stream_becomes_events() {
    let url = spawn(fake_ollama()).await;
    let client = OllamaClient::new(backend(&url, "llama2")).unwrap();

    let mut request = chat_request("hi");
    request.stream = true;
    let upstream = client.complete_stream(&request).await.unwrap();
    let body = collect(ndjson_to_sse(upstream)).await;
    assert_eq!(
        body,
        "data: {\"content\":\"Hel\"}\n\ndata: {\"content\":\"lo\"}\n\ndata: [DONE]\n\n"
    );
}

#[tokio::test]
async fn openllm_models_and_health() {
    let url = spawn(fake_openllm()).await;
    let client = OpenLlmClient::new(backend(&url, "facebook/opt-1.3b")).unwrap();
    assert!(client.check_health().await);

    let models = client.list_models().await;
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].name, "facebook/opt-1.3b");
    assert_eq!(models[0].owned_by.as_deref(), Some("openllm"));
}

#[tokio::test]
async fn openllm_completions() {
    let url = spawn(fake_openllm()).await;
    let client = OpenLlmClient::new(backend(&url, "facebook/opt-1.3b")).unwrap();

    let resp = client.complete(&chat_request("hello")).await;
    assert_eq!(resp.data(), Some("echo: hello"));
    assert_eq!(resp.usage(), Some(Usage::new(2, 3)));
    assert_eq!(resp.model(), "facebook/opt-1.3b");

    let resp = client.complete(&prompt_request("tell me", None)).await;
    assert!(resp.is_success());
    assert_eq!(resp.data(), Some("max=1024"));
    assert_eq!(resp.usage(), Some(Usage::new(4, 6)));

    let resp = client.complete(&prompt_request("crash", None)).await;
    assert!(!resp.is_success());
    assert_eq!(resp.error(), Some("engine crashed"));
}

#[tokio::test]
async fn openllm_stream_is_forwarded_verbatim() {
    let url = spawn(fake_openllm()).await;
    let client = OpenLlmClient::new(backend(&url, "facebook/opt-1.3b")).unwrap();

    let mut request = chat_request("hi");
    request.stream = true;
    let upstream = client.complete_stream(&request).await.unwrap();
    let body = collect(llm_gateway::streaming::passthrough(upstream)).await;
    assert_eq!(body, OPENLLM_STREAM);
}

#[tokio::test]
async fn gateway_end_to_end() {
    let ollama_url = spawn(fake_ollama()).await;
    let config = Arc::new(AppConfig {
        server_port: 0,
        cors_origin: "*".to_string(),
        ollama: backend(&ollama_url, "llama2"),
        openllm: backend(DEAD_URL, "facebook/opt-1.3b"),
        health_check_interval: Duration::ZERO,
    });
    let app = build_router(AppState::from_config(config).unwrap());

    let request = Request::post("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(json!({ "message": "hey" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["content"], "hey|1024");
    assert_eq!(body["data"]["usage"]["total_tokens"], 12);

    let request = Request::post("/api/openllm/generate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(json!({ "prompt": "x" }).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn openllm_rejected_stream_yields_none() {
    let url = spawn(fake_openllm()).await;
    let client = OpenLlmClient::new(backend(&url, "facebook/opt-1.3b")).unwrap();

    let mut request = chat_request("hi");
    request.model = Some("busy".to_string());
    request.stream = true;
    assert!(client.complete_stream(&request).await.is_none());

    let resp = client.complete(&request).await;
    assert_eq!(resp.error(), Some("model is loading"));
}

#[tokio::test]
async fn error_status_fails_health_checks() {
    let url = spawn(
        Router::new()
            .route("/api/version", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/health", get(|| async { StatusCode::NOT_FOUND })),
    )
    .await;

    let ollama = OllamaClient::new(backend(&url, "llama2")).unwrap();
    assert!(!ollama.check_health().await);
    let openllm = OpenLlmClient::new(backend(&url, "facebook/opt-1.3b")).unwrap();
    assert!(!openllm.check_health().await);
}

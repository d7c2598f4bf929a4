//! HTTP clients for the local inference daemons.
//!
//! Every call is a single attempt. Failures are logged and turned into a
//! value (`false`, an empty list, a failed `CompletionResponse`, `None`)
//! instead of being propagated.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use reqwest::Client;

use crate::types::{CompletionRequest, CompletionResponse, ModelInfo};

pub mod ollama;
pub mod openllm;

pub use ollama::OllamaClient;
pub use openllm::OpenLlmClient;

/// Live upstream body, consumed chunk by chunk.
pub type ByteStream = BoxStream<'static, anyhow::Result<Bytes>>;

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Human-readable service name used in logs and error messages.
    fn name(&self) -> &'static str;

    fn default_model(&self) -> &str;

    /// Reachability probe with a short timeout. Never fails.
    async fn check_health(&self) -> bool;

    /// Empty on any failure.
    async fn list_models(&self) -> Vec<ModelInfo>;

    /// Waits for the whole upstream body.
    async fn complete(&self, request: &CompletionRequest) -> CompletionResponse;

    /// `None` when the upstream handshake fails.
    async fn complete_stream(&self, request: &CompletionRequest) -> Option<ByteStream>;
}

/// Shared reqwest client. Only connection setup is bounded here; per-call
/// timeouts are set on each request so streams are not cut short.
pub(crate) fn http_client(connect_timeout: std::time::Duration) -> anyhow::Result<Client> {
    Ok(Client::builder().connect_timeout(connect_timeout).build()?)
}

/// Extracts `error.message` (OpenAI style) or `error` (Ollama style) from an
/// error body, falling back to the status line.
pub(crate) async fn error_from_response(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|json| {
            let err = json.get("error")?;
            err.get("message")
                .and_then(|m| m.as_str())
                .or_else(|| err.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16()))
}

use axum::extract::rejection::JsonRejection;
use axum::response::Response;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::{completion_response, json_body, ModelList};
use crate::app::AppState;
use crate::envelope::ApiResponse;
use crate::error::ApiError;
use crate::relay::{relay, RelayReply, RelayRequest};
use crate::streaming::{event_stream_response, passthrough};
use crate::types::{ChatMessage, GenerationOptions};

/// `POST /api/openllm/chat` body.
#[derive(Debug, Deserialize)]
pub struct OpenLlmChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub options: Option<GenerationOptions>,
}

impl OpenLlmChatRequest {
    fn into_relay(self) -> Result<RelayRequest, ApiError> {
        let messages = match (self.messages, self.message) {
            (Some(messages), _) => Some(messages),
            (None, Some(message)) if message.trim().is_empty() => {
                return Err(ApiError::empty_message())
            }
            (None, Some(message)) => Some(vec![ChatMessage::user(message)]),
            (None, None) => None,
        };
        Ok(RelayRequest {
            prompt: None,
            messages,
            model: self.model,
            options: self.options.unwrap_or_default(),
            stream: self.stream,
        })
    }
}

/// `POST /api/openllm/generate` body.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
}

impl From<GenerateRequest> for RelayRequest {
    fn from(req: GenerateRequest) -> Self {
        RelayRequest {
            prompt: req.prompt,
            messages: None,
            model: req.model,
            options: GenerationOptions {
                temperature: req.temperature,
                max_tokens: req.max_tokens,
                top_p: req.top_p,
                stop: req.stop,
            },
            stream: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub service: &'static str,
}

pub async fn chat(
    Extension(state): Extension<AppState>,
    payload: Result<Json<OpenLlmChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(payload)?.into_relay()?;
    match relay(state.openllm.as_ref(), request).await? {
        RelayReply::Complete(resp) => Ok(completion_response(resp)),
        RelayReply::Stream(stream) => {
            state.stats.record_stream();
            // OpenLLM already frames its output as SSE
            Ok(event_stream_response(passthrough(stream)))
        }
    }
}

/// 文本补全
pub async fn generate(
    Extension(state): Extension<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = RelayRequest::from(json_body(payload)?);
    match relay(state.openllm.as_ref(), request).await? {
        RelayReply::Complete(resp) => Ok(completion_response(resp)),
        RelayReply::Stream(_) => Err(ApiError::Internal(anyhow::anyhow!(
            "generate never requests a stream"
        ))),
    }
}

pub async fn health(Extension(state): Extension<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let healthy = state.openllm.check_health().await;
    let message = if healthy {
        "OpenLLM is reachable"
    } else {
        "OpenLLM is not reachable"
    };
    Json(ApiResponse::ok(
        HealthStatus {
            healthy,
            service: state.openllm.name(),
        },
        message,
    ))
}

pub async fn list_models(Extension(state): Extension<AppState>) -> Json<ApiResponse<ModelList>> {
    let models = state.openllm.list_models().await;
    Json(ApiResponse::ok(ModelList::from(models), "models listed"))
}

use axum::extract::rejection::JsonRejection;
use axum::response::Response;
use axum::{Extension, Json};
use serde::Deserialize;

use super::{completion_response, json_body};
use crate::app::AppState;
use crate::error::ApiError;
use crate::relay::{relay, RelayReply, RelayRequest};
use crate::streaming::{event_stream_response, ndjson_to_sse};
use crate::types::ChatMessage;

/// `POST /api/chat` body.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    fn into_relay(self, stream: bool) -> Result<RelayRequest, ApiError> {
        let message = self.message.unwrap_or_default();
        if message.trim().is_empty() {
            return Err(ApiError::empty_message());
        }
        Ok(RelayRequest {
            messages: Some(vec![ChatMessage::user(message)]),
            model: self.model,
            stream,
            ..Default::default()
        })
    }
}

/// 接收 /api/chat 的POST请求，`stream: true` 时转为流式响应
pub async fn chat(
    Extension(state): Extension<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(payload)?;
    let stream = request.stream;
    let request = request.into_relay(stream)?;
    Ok(respond(&state, relay(state.ollama.as_ref(), request).await?))
}

/// 接收 /api/chat/stream 的POST请求
pub async fn chat_stream(
    Extension(state): Extension<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(payload)?.into_relay(true)?;
    Ok(respond(&state, relay(state.ollama.as_ref(), request).await?))
}

fn respond(state: &AppState, reply: RelayReply) -> Response {
    match reply {
        RelayReply::Complete(resp) => completion_response(resp),
        RelayReply::Stream(stream) => {
            state.stats.record_stream();
            event_stream_response(ndjson_to_sse(stream))
        }
    }
}

use axum::http::StatusCode;
use serde::Deserialize;

use crate::error::ApiError;
use crate::types::{ChatMessage, CompletionInput, CompletionRequest, CompletionResponse, GenerationOptions};
use crate::upstream::{ByteStream, InferenceBackend};

/// Caller-supplied completion payload before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub options: GenerationOptions,
    #[serde(default)]
    pub stream: bool,
}

impl RelayRequest {
    /// Messages win over a prompt when both are given.
    pub fn validate(self) -> Result<CompletionRequest, ApiError> {
        let input = match (self.messages, self.prompt) {
            (Some(messages), _) if !messages.is_empty() => CompletionInput::Messages(messages),
            (_, Some(prompt)) if prompt.trim().is_empty() => return Err(ApiError::empty_message()),
            (_, Some(prompt)) => CompletionInput::Prompt(prompt),
            _ => {
                return Err(ApiError::invalid_request(
                    "either a prompt or a message list is required",
                ))
            }
        };

        Ok(CompletionRequest {
            input,
            model: self.model,
            options: self.options,
            stream: self.stream,
        })
    }
}

pub enum RelayReply {
    Complete(CompletionResponse),
    Stream(ByteStream),
}

impl std::fmt::Debug for RelayReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayReply::Complete(resp) => f.debug_tuple("Complete").field(resp).finish(),
            RelayReply::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Validates `request`, probes `backend`, then runs one completion call.
///
/// A failed probe returns `ServiceUnavailable` before any completion call is
/// made. The `stream` flag picks between `complete` and `complete_stream`.
pub async fn relay(
    backend: &dyn InferenceBackend,
    request: RelayRequest,
) -> Result<RelayReply, ApiError> {
    let request = request.validate()?;
    dispatch(backend, &request).await
}

/// Same as [`relay`] for a request that is already validated.
pub async fn dispatch(
    backend: &dyn InferenceBackend,
    request: &CompletionRequest,
) -> Result<RelayReply, ApiError> {
    if !backend.check_health().await {
        return Err(unavailable(backend));
    }

    let model = request.model_or(backend.default_model());
    if request.stream {
        tracing::info!(backend = backend.name(), %model, "relaying streamed completion");
        return match backend.complete_stream(request).await {
            Some(stream) => Ok(RelayReply::Stream(stream)),
            None => Err(ApiError::Upstream(format!(
                "unable to open a stream to {}",
                backend.name()
            ))),
        };
    }

    tracing::info!(backend = backend.name(), %model, "relaying completion");
    Ok(RelayReply::Complete(backend.complete(request).await))
}

pub fn unavailable(backend: &dyn InferenceBackend) -> ApiError {
    ApiError::ServiceUnavailable(format!(
        "{} service is unavailable, make sure {} is running",
        backend.name(),
        backend.name()
    ))
}

pub fn completion_status(resp: &CompletionResponse) -> StatusCode {
    if resp.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_prompt_or_messages() {
        let err = RelayRequest::default().validate().unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");

        let err = RelayRequest {
            messages: Some(vec![]),
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn blank_prompt_is_empty_message() {
        let err = RelayRequest {
            prompt: Some(" \n".into()),
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.code(), "EMPTY_MESSAGE");
    }

    #[test]
    fn messages_take_precedence() {
        let req = RelayRequest {
            prompt: Some("ignored".into()),
            messages: Some(vec![ChatMessage::user("hi")]),
            stream: true,
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(req.input, CompletionInput::Messages(vec![ChatMessage::user("hi")]));
        assert!(req.stream);
    }

    #[test]
    fn status_follows_success_flag() {
        assert_eq!(completion_status(&CompletionResponse::ok("x", "m", None)), StatusCode::OK);
        assert_eq!(
            completion_status(&CompletionResponse::failed("x", "m")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{error_from_response, http_client, ByteStream, InferenceBackend};
use crate::config::BackendConfig;
use crate::types::{
    ChatMessage, CompletionInput, CompletionRequest, CompletionResponse, ModelInfo, Usage,
};

/// Client for an OpenLLM server speaking the OpenAI-compatible `/v1` API.
pub struct OpenLlmClient {
    client: Client,
    config: BackendConfig,
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct TextCompletionBody<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
    stop: Vec<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    text: Option<String>,
}

/// Body of both `/v1/chat/completions` and `/v1/completions`.
#[derive(Debug, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

impl CompletionBody {
    /// Fills in `total_tokens` when the server left it out.
    fn usage(&self) -> Option<Usage> {
        self.usage.map(|u| match u.total_tokens {
            0 => Usage::new(u.prompt_tokens, u.completion_tokens),
            _ => u,
        })
    }

    fn content(&self) -> String {
        self.choices
            .first()
            .and_then(|c| {
                c.message
                    .as_ref()
                    .and_then(|m| m.content.clone())
                    .or_else(|| c.text.clone())
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct OpenLlmModel {
    id: String,
    #[serde(default)]
    owned_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<OpenLlmModel>,
}

impl OpenLlmClient {
    pub fn new(config: BackendConfig) -> anyhow::Result<Self> {
        let client = http_client(config.health_timeout)?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn completion_call(&self, request: &CompletionRequest, stream: bool) -> reqwest::RequestBuilder {
        let model = request.model_or(&self.config.default_model);
        let opts = request.options.resolve(&self.config.generation);
        match &request.input {
            CompletionInput::Messages(messages) => self
                .client
                .post(self.url("/v1/chat/completions"))
                .json(&ChatCompletionBody {
                    model,
                    messages,
                    temperature: opts.temperature,
                    max_tokens: opts.max_tokens,
                    top_p: opts.top_p,
                    stop: opts.stop,
                    stream,
                }),
            CompletionInput::Prompt(prompt) => self
                .client
                .post(self.url("/v1/completions"))
                .json(&TextCompletionBody {
                    model,
                    prompt,
                    temperature: opts.temperature,
                    max_tokens: opts.max_tokens,
                    top_p: opts.top_p,
                    stop: opts.stop,
                    stream,
                }),
        }
    }

    async fn try_complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, String> {
        let model = request.model_or(&self.config.default_model).to_string();
        let resp = self
            .completion_call(request, false)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let body: CompletionBody = resp.json().await.map_err(|e| e.to_string())?;
        Ok(CompletionResponse::ok(body.content(), model, body.usage()))
    }
}

#[async_trait]
impl InferenceBackend for OpenLlmClient {
    fn name(&self) -> &'static str {
        "OpenLLM"
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    async fn check_health(&self) -> bool {
        let result = self
            .client
            .get(self.url("/health"))
            .timeout(self.config.health_timeout)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!("OpenLLM health check failed: HTTP {}", resp.status().as_u16());
                false
            }
            Err(e) => {
                tracing::warn!("OpenLLM health check failed: {}", e);
                false
            }
        }
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        let result = async {
            let resp = self
                .client
                .get(self.url("/v1/models"))
                .timeout(self.config.request_timeout)
                .send()
                .await?
                .error_for_status()?;
            resp.json::<ModelList>().await
        }
        .await;

        match result {
            Ok(list) => list
                .data
                .into_iter()
                .map(|m| ModelInfo {
                    owned_by: m.owned_by,
                    ..ModelInfo::named(m.id)
                })
                .collect(),
            Err(e) => {
                tracing::error!("Failed to list OpenLLM models: {}", e);
                Vec::new()
            }
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> CompletionResponse {
        let model = request.model_or(&self.config.default_model).to_string();
        match self.try_complete(request).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(%model, "OpenLLM completion failed: {}", e);
                CompletionResponse::failed(e, model)
            }
        }
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Option<ByteStream> {
        let model = request.model_or(&self.config.default_model);
        let resp = match self.completion_call(request, true).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(%model, "OpenLLM stream request failed: {}", e);
                return None;
            }
        };

        if !resp.status().is_success() {
            let err = error_from_response(resp).await;
            tracing::error!(%model, "OpenLLM stream rejected: {}", err);
            return None;
        }

        Some(resp.bytes_stream().map_err(anyhow::Error::from).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_from_chat_or_text_choice() {
        let chat: CompletionBody = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}],
                "usage":{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3}}"#,
        )
        .unwrap();
        assert_eq!(chat.content(), "hello");
        assert_eq!(chat.usage, Some(Usage::new(1, 2)));

        let text: CompletionBody =
            serde_json::from_str(r#"{"choices":[{"text":"world","index":0}]}"#).unwrap();
        assert_eq!(text.content(), "world");

        let empty: CompletionBody = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.content(), "");
    }

    #[test]
    fn usage_without_total_still_parses() {
        let body: CompletionBody = serde_json::from_str(
            r#"{"choices":[{"text":"ok"}],"usage":{"prompt_tokens":4,"completion_tokens":5}}"#,
        )
        .unwrap();
        assert_eq!(body.content(), "ok");
        assert_eq!(body.usage(), Some(Usage::new(4, 5)));

        let body: CompletionBody =
            serde_json::from_str(r#"{"choices":[{"text":"ok"}],"usage":{}}"#).unwrap();
        assert_eq!(body.usage(), Some(Usage::new(0, 0)));
    }
}

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{error_from_response, http_client, ByteStream, InferenceBackend};
use crate::config::BackendConfig;
use crate::types::{
    ChatMessage, CompletionInput, CompletionRequest, CompletionResponse, ModelInfo,
    ResolvedOptions, Usage,
};

/// Client for an Ollama daemon (`/api/*`).
pub struct OllamaClient {
    client: Client,
    config: BackendConfig,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f64,
    num_predict: u32,
    top_p: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

impl From<ResolvedOptions> for OllamaOptions {
    fn from(opts: ResolvedOptions) -> Self {
        Self {
            temperature: opts.temperature,
            num_predict: opts.max_tokens,
            top_p: opts.top_p,
            stop: opts.stop,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

/// Shape shared by `/api/chat` and `/api/generate`, whole or per NDJSON line.
#[derive(Debug, Deserialize)]
pub(crate) struct OllamaReply {
    #[serde(default)]
    message: Option<ReplyMessage>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    pub(crate) done: bool,
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

impl OllamaReply {
    pub(crate) fn content(&self) -> &str {
        self.message
            .as_ref()
            .map(|m| m.content.as_str())
            .or(self.response.as_deref())
            .unwrap_or("")
    }

    fn usage(&self) -> Option<Usage> {
        match (self.prompt_eval_count, self.eval_count) {
            (None, None) => None,
            (prompt, completion) => Some(Usage::new(prompt.unwrap_or(0), completion.unwrap_or(0))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    pub fn new(config: BackendConfig) -> anyhow::Result<Self> {
        let client = http_client(config.health_timeout)?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Builds the chat or generate call for `request`.
    fn completion_call(&self, request: &CompletionRequest, stream: bool) -> reqwest::RequestBuilder {
        let model = request.model_or(&self.config.default_model);
        let options = OllamaOptions::from(request.options.resolve(&self.config.generation));
        match &request.input {
            CompletionInput::Messages(messages) => self.client.post(self.url("/api/chat")).json(&ChatBody {
                model,
                messages,
                stream,
                options,
            }),
            CompletionInput::Prompt(prompt) => {
                self.client.post(self.url("/api/generate")).json(&GenerateBody {
                    model,
                    prompt,
                    stream,
                    options,
                })
            }
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

        let reply: OllamaReply = resp.json().await.map_err(|e| e.to_string())?;
        if let Some(err) = reply.error {
            return Err(err);
        }
        Ok(CompletionResponse::ok(reply.content(), model, reply.usage()))
    }
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    async fn check_health(&self) -> bool {
        let result = self
            .client
            .get(self.url("/api/version"))
            .timeout(self.config.health_timeout)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!("Ollama health check failed: HTTP {}", resp.status().as_u16());
                false
            }
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                false
            }
        }
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        let result = async {
            let resp = self
                .client
                .get(self.url("/api/tags"))
                .timeout(self.config.request_timeout)
                .send()
                .await?
                .error_for_status()?;
            resp.json::<TagsResponse>().await
        }
        .await;

        match result {
            Ok(tags) => tags.models,
            Err(e) => {
                tracing::error!("Failed to list Ollama models: {}", e);
                Vec::new()
            }
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> CompletionResponse {
        let model = request.model_or(&self.config.default_model).to_string();
        match self.try_complete(request).await {
            Ok(resp) => {
                tracing::debug!(%model, "Ollama completion finished");
                resp
            }
            Err(e) => {
                tracing::error!(%model, "Ollama completion failed: {}", e);
                CompletionResponse::failed(e, model)
            }
        }
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Option<ByteStream> {
        let model = request.model_or(&self.config.default_model);
        let resp = match self.completion_call(request, true).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(%model, "Ollama stream request failed: {}", e);
                return None;
            }
        };

        if !resp.status().is_success() {
            let err = error_from_response(resp).await;
            tracing::error!(%model, "Ollama stream rejected: {}", err);
            return None;
        }

        tracing::debug!(%model, "Ollama stream opened");
        Some(resp.bytes_stream().map_err(anyhow::Error::from).boxed())
    }
}

use serde::{Deserialize, Serialize};

use crate::config::GenerationDefaults;

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 用户 / 系统 / 助手消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Per-request generation parameters. Unset fields take the backend defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// Generation parameters with every default filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub stop: Vec<String>,
}

impl GenerationOptions {
    pub fn resolve(&self, defaults: &GenerationDefaults) -> ResolvedOptions {
        ResolvedOptions {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            stop: self.stop.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionInput {
    Prompt(String),
    Messages(Vec<ChatMessage>),
}

/// A validated completion request. Construct through `relay::RelayRequest::validate`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub input: CompletionInput,
    pub model: Option<String>,
    pub options: GenerationOptions,
    pub stream: bool,
}

impl CompletionRequest {
    pub fn model_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(default)
    }
}

/// Token counts. Missing fields read as zero; some OpenAI-compatible servers
/// omit `total_tokens`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Result of a non-streaming completion. Exactly one of `data` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<Usage>,
}

impl CompletionResponse {
    pub fn ok(data: impl Into<String>, model: impl Into<String>, usage: Option<Usage>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            error: None,
            model: model.into(),
            usage,
        }
    }

    pub fn failed(error: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            model: model.into(),
            usage: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }
}

/// A model advertised by an upstream daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ModelInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            modified_at: None,
            digest: None,
            owned_by: None,
            details: None,
        }
    }
}

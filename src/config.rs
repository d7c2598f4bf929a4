use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;

/// Defaults applied to generation fields the caller left unset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationDefaults {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            top_p: 0.9,
        }
    }
}

/// Connection settings for one inference daemon.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub default_model: String,
    pub request_timeout: Duration,
    pub health_timeout: Duration,
    pub generation: GenerationDefaults,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // 服务器设置
    pub server_port: u16,
    pub cors_origin: String,

    // 上游推理服务
    pub ollama: BackendConfig,
    pub openllm: BackendConfig,

    /// Zero disables the background monitor.
    pub health_check_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let server_port = env_or("SERVER_PORT", 3000u16);
        let cors_origin = env::var("CORS_ORIGIN").unwrap_or_else(|_| "*".to_string());

        let health_timeout = Duration::from_secs(env_or("HEALTH_TIMEOUT_SECS", 5u64));
        let generation = GenerationDefaults {
            temperature: env_or("DEFAULT_TEMPERATURE", 0.7f64),
            max_tokens: env_or("DEFAULT_MAX_TOKENS", 1024u32),
            top_p: env_or("DEFAULT_TOP_P", 0.9f64),
        };

        let ollama = BackendConfig {
            base_url: normalize_url(
                &env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ),
            default_model: env::var("OLLAMA_DEFAULT_MODEL").unwrap_or_else(|_| "llama2".to_string()),
            request_timeout: Duration::from_secs(env_or("OLLAMA_TIMEOUT_SECS", 30u64)),
            health_timeout,
            generation,
        };

        let openllm = BackendConfig {
            base_url: normalize_url(
                &env::var("OPENLLM_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            ),
            default_model: env::var("OPENLLM_DEFAULT_MODEL")
                .unwrap_or_else(|_| "facebook/opt-1.3b".to_string()),
            request_timeout: Duration::from_secs(env_or("OPENLLM_TIMEOUT_SECS", 60u64)),
            health_timeout,
            generation,
        };

        let health_check_interval =
            Duration::from_secs(env_or("HEALTH_CHECK_INTERVAL_SECS", 60u64));

        Ok(Self {
            server_port,
            cors_origin,
            ollama,
            openllm,
            health_check_interval,
        })
    }
}

/// Loads `.env` from the working directory into the process environment.
/// A missing file is not an error; variables already set are kept.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::info!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => tracing::debug!("no .env file, using process environment"),
        Err(e) => tracing::warn!("ignoring unreadable .env: {}", e),
    }
}

impl BackendConfig {
    /// Settings pointing at `base_url` with every other value at its default.
    pub fn new(base_url: &str, default_model: &str) -> Self {
        Self {
            base_url: normalize_url(base_url),
            default_model: default_model.to_string(),
            request_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(5),
            generation: GenerationDefaults::default(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_are_stripped() {
        assert_eq!(normalize_url("http://localhost:11434/"), "http://localhost:11434");
        assert_eq!(normalize_url(" http://host// "), "http://host");
    }

    #[test]
    fn unparseable_values_fall_back_to_default() {
        env::set_var("LLM_GATEWAY_TEST_PORT", "not-a-port");
        assert_eq!(env_or("LLM_GATEWAY_TEST_PORT", 3000u16), 3000);
        env::set_var("LLM_GATEWAY_TEST_PORT", " 8081 ");
        assert_eq!(env_or("LLM_GATEWAY_TEST_PORT", 3000u16), 8081);
        env::remove_var("LLM_GATEWAY_TEST_PORT");
    }

    #[test]
    fn backend_config_uses_generation_defaults() {
        let cfg = BackendConfig::new("http://127.0.0.1:9/", "llama2");
        assert_eq!(cfg.base_url, "http://127.0.0.1:9");
        assert_eq!(cfg.generation, GenerationDefaults::default());
    }
}

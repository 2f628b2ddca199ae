//! Anthropic Messages API 客户端
//!
//! POST {base_url}/messages，x-api-key + anthropic-version 头；单次调用有超时，不做重试。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::LlmSection;
use crate::llm::{LlmClient, LlmError, ModelRequest, ModelResponse, TokenUsage};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    /// 进程内累计 token 使用统计
    usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

impl AnthropicClient {
    pub fn new(
        base_url: Option<&str>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::Config("ANTHROPIC_API_KEY is not set".into()))?
            .to_string();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            timeout,
            usage: TokenUsage::new(),
        })
    }

    pub fn from_config(cfg: &LlmSection) -> Result<Self, LlmError> {
        if !cfg.provider.eq_ignore_ascii_case("anthropic") {
            return Err(LlmError::Config(format!(
                "unsupported provider '{}'",
                cfg.provider
            )));
        }
        Self::new(
            cfg.base_url.as_deref(),
            cfg.resolved_api_key().as_deref(),
            Duration::from_secs(cfg.timeouts.request),
        )
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.timeout.as_secs())
        } else {
            LlmError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: &ModelRequest<'_>) -> Result<ModelResponse, LlmError> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(parsed) => format!("{}: {}", parsed.error.error_type, parsed.error.message),
                Err(_) => body.chars().take(500).collect(),
            };
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ModelResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        self.usage.add(parsed.usage);
        tracing::debug!(
            model = request.model,
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            stop_reason = ?parsed.stop_reason,
            "LLM call completed"
        );
        Ok(parsed)
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}

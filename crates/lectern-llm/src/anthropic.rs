//! Anthropic (Claude) provider implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use lectern_core::error::{ErrorCode, LecternError, LecternResult};
use lectern_core::ratelimit::RateLimiter;
use lectern_core::traits::{
    GenerationOptions, Provider, ProviderCapabilities, ProviderHealth, ProviderResponse, TokenUsage,
};
use lectern_core::types::Prompt;
use lectern_core::ProviderConfig;

use crate::http::{self, ApiKey};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Messages API requires `max_tokens`.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic provider.
pub struct AnthropicProvider {
    id: String,
    client: Client,
    config: ProviderConfig,
    api_key: Option<ApiKey>,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<AnthropicContent>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicModels {
    data: Vec<AnthropicModel>,
}

#[derive(Debug, Deserialize)]
struct AnthropicModel {
    id: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(
        id: impl Into<String>,
        config: ProviderConfig,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
    ) -> LecternResult<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| ANTHROPIC_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            id: id.into(),
            client: http::build_client(timeout)?,
            api_key: http::resolve_api_key(&config),
            config,
            base_url,
            limiter,
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> LecternResult<reqwest::RequestBuilder> {
        let key = http::require_key(&self.id, &self.api_key, self.config.kind.api_key_env())?;
        Ok(builder
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION))
    }

    fn parse_message(&self, body: &str, model: &str) -> LecternResult<ProviderResponse> {
        let response: AnthropicResponse = http::parse_body(&self.id, body)?;

        if response.stop_reason.as_deref() == Some("refusal") {
            return Err(LecternError::permanent(
                &self.id,
                ErrorCode::PrvContentPolicy,
                "model refused the request",
            ));
        }

        // Extract text content
        let content: String = response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        if content.trim().is_empty() {
            return Err(LecternError::transient(&self.id, ErrorCode::PrvInvalidResponse, "response contained no text"));
        }

        let mut result = ProviderResponse::new(&self.id, response.model.unwrap_or_else(|| model.to_string()), content);
        if let Some(usage) = response.usage {
            result = result.with_usage(TokenUsage::new(usage.input_tokens, usage.output_tokens));
        }
        Ok(result)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            max_context_tokens: self.config.context_tokens(),
            supports_streaming: true,
            rate_limit: self.limiter.policy().clone(),
        }
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        model: &str,
        options: &GenerationOptions,
    ) -> LecternResult<ProviderResponse> {
        let max_tokens = options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let request = AnthropicRequest {
            model,
            max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            system: prompt.system.as_deref(),
            messages: vec![AnthropicMessage {
                role: "user",
                content: &prompt.user,
            }],
        };

        let builder = self.request(self.client.post(format!("{}/messages", self.base_url)))?;
        self.limiter.acquire(prompt.estimated_tokens() + max_tokens).await?;

        tracing::debug!(provider = %self.id, model, "Sending Anthropic message");
        let body = http::send(&self.id, builder.json(&request)).await?;
        self.parse_message(&body, model)
    }

    async fn available_models(&self) -> LecternResult<Vec<String>> {
        let builder = self.request(self.client.get(format!("{}/models", self.base_url)))?;
        let body = http::send(&self.id, builder).await?;
        let models: AnthropicModels = http::parse_body(&self.id, &body)?;
        let ids = models.data.into_iter().map(|m| m.id).collect();
        Ok(http::merge_models(ids, &self.config.extra_models))
    }

    async fn health_check(&self) -> ProviderHealth {
        match self.available_models().await {
            Ok(_) => ProviderHealth::Healthy,
            Err(e) => ProviderHealth::Unhealthy { message: e.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_core::ProviderKind;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(
            "anthropic",
            ProviderConfig::for_kind(ProviderKind::Anthropic).with_api_key("sk-ant-test"),
            Arc::new(RateLimiter::unlimited("anthropic")),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_joins_text_blocks() {
        let body = r##"{"model":"claude-3-5-sonnet-20241022","content":[{"type":"text","text":"# Unit"},{"type":"text","text":" one"}],"stop_reason":"end_turn","usage":{"input_tokens":10,"output_tokens":4}}"##;
        let response = provider().parse_message(body, "x").unwrap();
        assert_eq!(response.content, "# Unit one");
        assert_eq!(response.usage.unwrap().prompt_tokens, 10);
    }

    #[test]
    fn test_refusal_is_permanent() {
        let body = r#"{"content":[],"stop_reason":"refusal"}"#;
        let err = provider().parse_message(body, "x").unwrap_err();
        assert_eq!(err.code(), ErrorCode::PrvContentPolicy);
    }

    #[test]
    fn test_request_omits_absent_system() {
        let request = AnthropicRequest {
            model: "m",
            max_tokens: 10,
            temperature: None,
            top_p: None,
            system: None,
            messages: vec![AnthropicMessage { role: "user", content: "hi" }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }
}

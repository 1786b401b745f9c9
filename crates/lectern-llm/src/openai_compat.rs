//! OpenAI-compatible chat completions (OpenAI, Groq, xAI, self-hosted servers).

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
use lectern_core::types::{MessageRole, Prompt};
use lectern_core::{ProviderConfig, ProviderKind};

use crate::http::{self, ApiKey};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const GROQ_API_URL: &str = "https://api.groq.com/openai/v1";
const XAI_API_URL: &str = "https://api.x.ai/v1";

/// Default base URL for a kind that speaks the OpenAI protocol.
pub fn default_base_url(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Groq => GROQ_API_URL,
        ProviderKind::Xai => XAI_API_URL,
        _ => OPENAI_API_URL,
    }
}

/// Chat-completions adapter with bearer authentication.
pub struct OpenAICompatProvider {
    id: String,
    client: Client,
    config: ProviderConfig,
    api_key: Option<ApiKey>,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

impl OpenAICompatProvider {
    /// Create an adapter registered under `id`.
    pub fn new(
        id: impl Into<String>,
        config: ProviderConfig,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
    ) -> LecternResult<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.kind).to_string())
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

    fn authorized(&self, request: reqwest::RequestBuilder) -> LecternResult<reqwest::RequestBuilder> {
        match self.config.kind {
            // Self-hosted servers commonly run without auth.
            ProviderKind::OpenAICompatible if self.api_key.is_none() => Ok(request),
            _ => {
                let key = http::require_key(&self.id, &self.api_key, self.config.kind.api_key_env())?;
                Ok(request.bearer_auth(key))
            }
        }
    }

    fn parse_completion(&self, body: &str, model: &str) -> LecternResult<ProviderResponse> {
        let response: ChatResponse = http::parse_body(&self.id, body)?;
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            LecternError::transient(&self.id, ErrorCode::PrvInvalidResponse, "response contained no choices")
        })?;
        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(LecternError::permanent(
                &self.id,
                ErrorCode::PrvContentPolicy,
                "completion stopped by content_filter",
            ));
        }
        let content = choice.message.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LecternError::transient(&self.id, ErrorCode::PrvInvalidResponse, "empty completion"));
        }

        let mut result = ProviderResponse::new(&self.id, response.model.unwrap_or_else(|| model.to_string()), content);
        if let Some(usage) = response.usage {
            result = result.with_usage(TokenUsage::new(usage.prompt_tokens, usage.completion_tokens));
        }
        Ok(result)
    }
}

#[async_trait]
impl Provider for OpenAICompatProvider {
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
        let messages = prompt.to_messages();
        let request = ChatRequest {
            model,
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: role_name(m.role),
                    content: &m.content,
                })
                .collect(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
        };

        let builder = self.authorized(self.client.post(format!("{}/chat/completions", self.base_url)))?;
        self.limiter
            .acquire(prompt.estimated_tokens() + options.max_tokens.unwrap_or(0))
            .await?;

        tracing::debug!(provider = %self.id, model, "Sending chat completion");
        let body = http::send(&self.id, builder.json(&request)).await?;
        self.parse_completion(&body, model)
    }

    async fn available_models(&self) -> LecternResult<Vec<String>> {
        let builder = self.authorized(self.client.get(format!("{}/models", self.base_url)))?;
        let body = http::send(&self.id, builder).await?;
        let list: ModelList = http::parse_body(&self.id, &body)?;
        let models = list.data.into_iter().map(|m| m.id).collect();
        Ok(http::merge_models(models, &self.config.extra_models))
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

    fn provider() -> OpenAICompatProvider {
        let config = ProviderConfig::for_kind(ProviderKind::Groq).with_api_key("gsk-test");
        OpenAICompatProvider::new(
            "groq",
            config,
            Arc::new(RateLimiter::unlimited("groq")),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_default_base_urls() {
        assert_eq!(provider().base_url, GROQ_API_URL);
        assert_eq!(default_base_url(ProviderKind::Xai), XAI_API_URL);
        assert_eq!(default_base_url(ProviderKind::OpenAI), OPENAI_API_URL);
    }

    #[test]
    fn test_parse_completion() {
        let body = r##"{"model":"llama-3.3-70b-versatile","choices":[{"message":{"role":"assistant","content":"# Notes"},"finish_reason":"stop"}],"usage":{"prompt_tokens":12,"completion_tokens":3,"total_tokens":15}}"##;
        let response = provider().parse_completion(body, "requested").unwrap();
        assert_eq!(response.content, "# Notes");
        assert_eq!(response.model, "llama-3.3-70b-versatile");
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_content_filter_is_permanent() {
        let body = r#"{"choices":[{"message":{"content":""},"finish_reason":"content_filter"}]}"#;
        let err = provider().parse_completion(body, "m").unwrap_err();
        assert_eq!(err.code(), ErrorCode::PrvContentPolicy);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_garbled_body_is_transient() {
        let err = provider().parse_completion("<html>", "m").unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_key_fails_permanently_without_network() {
        let config = ProviderConfig {
            api_key: None,
            ..ProviderConfig::for_kind(ProviderKind::Xai)
        };
        let provider = OpenAICompatProvider {
            api_key: None,
            ..OpenAICompatProvider::new(
                "xai",
                config,
                Arc::new(RateLimiter::unlimited("xai")),
                Duration::from_secs(1),
            )
            .unwrap()
        };
        let err = provider
            .generate(&Prompt::new("hi"), "grok-2-latest", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PrvAuthFailed);
    }
}

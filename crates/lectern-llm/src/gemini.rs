//! Google Gemini provider (Generative Language API).

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

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini provider.
pub struct GeminiProvider {
    id: String,
    client: Client,
    config: ProviderConfig,
    api_key: Option<ApiKey>,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

impl GeminiProvider {
    pub fn new(
        id: impl Into<String>,
        config: ProviderConfig,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
    ) -> LecternResult<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| GEMINI_API_URL.to_string())
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

    fn key(&self) -> LecternResult<&str> {
        http::require_key(&self.id, &self.api_key, self.config.kind.api_key_env())
    }

    fn parse_content(&self, body: &str, model: &str) -> LecternResult<ProviderResponse> {
        let response: GenerateContentResponse = http::parse_body(&self.id, body)?;

        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LecternError::permanent(
                &self.id,
                ErrorCode::PrvContentPolicy,
                format!("prompt blocked: {}", reason),
            ));
        }

        let candidate = response.candidates.into_iter().next().ok_or_else(|| {
            LecternError::transient(&self.id, ErrorCode::PrvInvalidResponse, "response contained no candidates")
        })?;
        if matches!(
            candidate.finish_reason.as_deref(),
            Some("SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST")
        ) {
            return Err(LecternError::permanent(
                &self.id,
                ErrorCode::PrvContentPolicy,
                format!("candidate blocked: {}", candidate.finish_reason.unwrap_or_default()),
            ));
        }

        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LecternError::transient(&self.id, ErrorCode::PrvInvalidResponse, "candidate contained no text"));
        }

        let mut result = ProviderResponse::new(
            &self.id,
            response.model_version.unwrap_or_else(|| model.to_string()),
            content,
        );
        if let Some(usage) = response.usage_metadata {
            result = result.with_usage(TokenUsage::new(usage.prompt_token_count, usage.candidates_token_count));
        }
        Ok(result)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
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
        let request = GenerateContentRequest {
            system_instruction: prompt.system.as_deref().map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: &prompt.user }],
            }],
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
                top_p: options.top_p,
            },
        };

        let key = self.key()?;
        self.limiter
            .acquire(prompt.estimated_tokens() + options.max_tokens.unwrap_or(0))
            .await?;

        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        tracing::debug!(provider = %self.id, model, "Sending Gemini generateContent");
        let builder = self.client.post(url).query(&[("key", key)]).json(&request);
        let body = http::send(&self.id, builder).await?;
        self.parse_content(&body, model)
    }

    async fn available_models(&self) -> LecternResult<Vec<String>> {
        let key = self.key()?;
        let builder = self
            .client
            .get(format!("{}/models", self.base_url))
            .query(&[("key", key)]);
        let body = http::send(&self.id, builder).await?;
        let list: ModelList = http::parse_body(&self.id, &body)?;
        let models = list
            .models
            .into_iter()
            .map(|m| m.name.trim_start_matches("models/").to_string())
            .collect();
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
    use lectern_core::ProviderKind;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(
            "gemini",
            ProviderConfig::for_kind(ProviderKind::Gemini).with_api_key("g-test"),
            Arc::new(RateLimiter::unlimited("gemini")),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_candidate_parts() {
        let body = r###"{"candidates":[{"content":{"role":"model","parts":[{"text":"## Topic"},{"text":"\nBody"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":20,"candidatesTokenCount":5,"totalTokenCount":25}}"###;
        let response = provider().parse_content(body, "gemini-1.5-flash").unwrap();
        assert_eq!(response.content, "## Topic\nBody");
        assert_eq!(response.model, "gemini-1.5-flash");
        assert_eq!(response.usage.unwrap().total_tokens, 25);
    }

    #[test]
    fn test_blocked_prompt_is_permanent() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let err = provider().parse_content(body, "m").unwrap_err();
        assert_eq!(err.code(), ErrorCode::PrvContentPolicy);
        assert!(!err.is_transient());

        let body = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        let err = provider().parse_content(body, "m").unwrap_err();
        assert_eq!(err.code(), ErrorCode::PrvContentPolicy);
    }

    #[test]
    fn test_request_shape_is_camel_case() {
        let request = GenerateContentRequest {
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part { text: "be brief" }],
            }),
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: "hello" }],
            }],
            generation_config: GenerationConfig {
                temperature: Some(0.7),
                max_output_tokens: Some(400),
                top_p: None,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 400);
        assert!(json["generationConfig"].get("topP").is_none());
    }
}

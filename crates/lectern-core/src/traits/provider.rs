//! Provider trait and related types.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LecternResult;
use crate::types::Prompt;

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens in the completion.
    pub completion_tokens: u32,
    /// Total tokens.
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Raw text output of one successful provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    /// Provider identifier.
    pub provider: String,
    /// Model that produced the text.
    pub model: String,
    /// Generated text content.
    pub content: String,
    /// Wall-clock latency of the successful attempt.
    pub latency: Duration,
    /// Token usage statistics, when the provider reports them.
    pub usage: Option<TokenUsage>,
    /// Attempts made against this provider, including the successful one.
    pub attempts: u32,
}

impl ProviderResponse {
    /// Create a response for a single attempt with no usage data.
    pub fn new(provider: impl Into<String>, model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            content: content.into(),
            latency: Duration::ZERO,
            usage: None,
            attempts: 1,
        }
    }

    /// Builder: set usage statistics.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Request pacing limits declared by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    /// Requests per minute. `None` means unlimited.
    pub requests_per_minute: Option<u32>,
    /// Estimated tokens per minute. `None` means unlimited.
    pub tokens_per_minute: Option<u32>,
    /// Longest time a caller may wait for capacity before failing.
    pub max_wait_ms: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            requests_per_minute: None,
            tokens_per_minute: None,
            max_wait_ms: 30_000,
        }
    }
}

impl RateLimitPolicy {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn per_minute(requests: u32, tokens: u32) -> Self {
        Self {
            requests_per_minute: Some(requests),
            tokens_per_minute: Some(tokens),
            ..Self::default()
        }
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// What a provider can do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCapabilities {
    /// Context window in tokens.
    pub max_context_tokens: u32,
    /// Whether the provider can stream responses.
    pub supports_streaming: bool,
    pub rate_limit: RateLimitPolicy,
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            max_context_tokens: 8_192,
            supports_streaming: false,
            rate_limit: RateLimitPolicy::default(),
        }
    }
}

/// Configuration options for one generation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Top-p nucleus sampling.
    pub top_p: Option<f32>,
}

impl GenerationOptions {
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Result of a provider health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProviderHealth {
    Healthy,
    Unhealthy { message: String },
    /// The provider has no cheap way to check.
    Unknown,
}

/// Core provider trait - all AI provider adapters implement this.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider identifier (`openai`, `groq`, ...).
    fn id(&self) -> &str;

    /// Model used when the request does not name one.
    fn default_model(&self) -> &str;

    /// Declared capabilities.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Generate text for a prompt.
    ///
    /// Failures must be classified: `LecternError::ProviderTransient` for anything
    /// worth retrying, `LecternError::ProviderPermanent` otherwise.
    async fn generate(
        &self,
        prompt: &Prompt,
        model: &str,
        options: &GenerationOptions,
    ) -> LecternResult<ProviderResponse>;

    /// Models this provider is configured for.
    async fn available_models(&self) -> LecternResult<Vec<String>> {
        Ok(vec![self.default_model().to_string()])
    }

    /// Check that the provider is reachable.
    async fn health_check(&self) -> ProviderHealth {
        ProviderHealth::Unknown
    }
}

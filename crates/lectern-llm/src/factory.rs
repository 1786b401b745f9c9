//! Factory for creating providers from configuration.

use std::sync::Arc;
use std::time::Duration;

use lectern_core::config::{LecternConfig, ProviderConfig, ProviderKind};
use lectern_core::error::LecternResult;
use lectern_core::ratelimit::RateLimitRegistry;
use lectern_core::registry::ProviderRegistry;
use lectern_core::traits::Provider;

use crate::anthropic::AnthropicProvider;
use crate::gemini::GeminiProvider;
use crate::ollama::OllamaProvider;
use crate::openai_compat::OpenAICompatProvider;

/// Factory for creating providers.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create the adapter for `config.kind`, registered under `id`.
    ///
    /// The rate limiter is shared per id through `limits`, so every adapter
    /// built for the same id paces against the same budget.
    pub fn create(
        id: &str,
        config: &ProviderConfig,
        limits: &RateLimitRegistry,
        timeout: Duration,
    ) -> LecternResult<Arc<dyn Provider>> {
        let limiter = limits.limiter(id, &config.rate_limit);
        let config = config.clone();
        match config.kind {
            ProviderKind::OpenAI | ProviderKind::Groq | ProviderKind::Xai | ProviderKind::OpenAICompatible => {
                Ok(Arc::new(OpenAICompatProvider::new(id, config, limiter, timeout)?))
            }
            ProviderKind::Anthropic => Ok(Arc::new(AnthropicProvider::new(id, config, limiter, timeout)?)),
            ProviderKind::Gemini => Ok(Arc::new(GeminiProvider::new(id, config, limiter, timeout)?)),
            ProviderKind::Ollama => Ok(Arc::new(OllamaProvider::new(id, config, limiter)?)),
        }
    }

    /// Create a provider of `kind` with its defaults (key from the environment).
    pub fn from_kind(kind: ProviderKind, limits: &RateLimitRegistry) -> LecternResult<Arc<dyn Provider>> {
        Self::create(
            &kind.to_string(),
            &ProviderConfig::for_kind(kind),
            limits,
            Duration::from_secs(120),
        )
    }
}

/// Build a registry with every provider configured in `config`.
pub fn build_registry(config: &LecternConfig, limits: &RateLimitRegistry) -> LecternResult<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    for (id, provider_config) in &config.providers {
        let provider = ProviderFactory::create(id, provider_config, limits, config.request_timeout())?;
        tracing::debug!(provider = %id, kind = %provider_config.kind, model = %provider_config.model, "Registered provider");
        registry.register(provider);
    }
    Ok(registry)
}

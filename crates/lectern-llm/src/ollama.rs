//! Ollama provider implementation.

use std::sync::Arc;

use async_trait::async_trait;

use lectern_core::error::{ErrorCode, LecternError, LecternResult};
use lectern_core::ratelimit::RateLimiter;
use lectern_core::traits::{
    GenerationOptions, Provider, ProviderCapabilities, ProviderHealth, ProviderResponse,
};
use lectern_core::types::Prompt;
use lectern_core::ProviderConfig;

#[cfg(feature = "ollama")]
use lectern_core::types::{Message, MessageRole};
#[cfg(feature = "ollama")]
use ollama_rs::{
    generation::chat::{ChatMessage, ChatMessageRequest, MessageRole as OllamaRole},
    generation::options::GenerationOptions as OllamaOptions,
    Ollama,
};

const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Ollama provider for locally hosted models.
pub struct OllamaProvider {
    id: String,
    #[cfg(feature = "ollama")]
    client: Ollama,
    config: ProviderConfig,
    limiter: Arc<RateLimiter>,
}

impl OllamaProvider {
    /// Create a new Ollama provider.
    pub fn new(id: impl Into<String>, config: ProviderConfig, limiter: Arc<RateLimiter>) -> LecternResult<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());

        // Parse host and port from base_url
        let url = url::Url::parse(&base_url)
            .map_err(|e| LecternError::Configuration(format!("Invalid Ollama URL: {}", e)))?;
        let host = url.host_str().unwrap_or("localhost").to_string();
        let port = url.port().unwrap_or(11434);
        tracing::debug!(host = %host, port, "Configured Ollama endpoint");

        #[cfg(feature = "ollama")]
        let client = Ollama::new(format!("{}://{}", url.scheme(), host), port);

        Ok(Self {
            id: id.into(),
            #[cfg(feature = "ollama")]
            client,
            config,
            limiter,
        })
    }

    #[cfg(feature = "ollama")]
    fn message_to_ollama(msg: &Message) -> ChatMessage {
        ChatMessage {
            role: match msg.role {
                MessageRole::System => OllamaRole::System,
                MessageRole::User => OllamaRole::User,
                MessageRole::Assistant => OllamaRole::Assistant,
            },
            content: msg.content.clone(),
            images: None,
        }
    }

    #[cfg(feature = "ollama")]
    fn unreachable(&self, err: impl std::fmt::Display) -> LecternError {
        LecternError::transient(&self.id, ErrorCode::PrvConnectionFailed, format!("Ollama API error: {}", err))
    }

    #[cfg(not(feature = "ollama"))]
    fn disabled(&self) -> LecternError {
        LecternError::permanent(
            &self.id,
            ErrorCode::PrvBadRequest,
            "Ollama feature not enabled. Enable the 'ollama' feature.",
        )
    }
}

#[async_trait]
impl Provider for OllamaProvider {
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

    #[cfg(feature = "ollama")]
    async fn generate(
        &self,
        prompt: &Prompt,
        model: &str,
        options: &GenerationOptions,
    ) -> LecternResult<ProviderResponse> {
        let messages: Vec<ChatMessage> = prompt.to_messages().iter().map(Self::message_to_ollama).collect();

        let mut model_options = OllamaOptions::default();
        if let Some(temperature) = options.temperature {
            model_options = model_options.temperature(temperature);
        }
        if let Some(max_tokens) = options.max_tokens {
            model_options = model_options.num_predict(i32::try_from(max_tokens).unwrap_or(i32::MAX));
        }
        if let Some(top_p) = options.top_p {
            model_options = model_options.top_p(top_p);
        }
        let request = ChatMessageRequest::new(model.to_string(), messages).options(model_options);

        self.limiter
            .acquire(prompt.estimated_tokens() + options.max_tokens.unwrap_or(0))
            .await?;

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| self.unreachable(e))?;

        let content = response.message.map(|m| m.content).unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LecternError::transient(&self.id, ErrorCode::PrvInvalidResponse, "empty response"));
        }
        Ok(ProviderResponse::new(&self.id, model, content))
    }

    #[cfg(not(feature = "ollama"))]
    async fn generate(
        &self,
        _prompt: &Prompt,
        _model: &str,
        _options: &GenerationOptions,
    ) -> LecternResult<ProviderResponse> {
        Err(self.disabled())
    }

    #[cfg(feature = "ollama")]
    async fn available_models(&self) -> LecternResult<Vec<String>> {
        let models = self
            .client
            .list_local_models()
            .await
            .map_err(|e| self.unreachable(e))?;
        let mut names: Vec<String> = models.into_iter().map(|m| m.name).collect();
        names.sort();
        Ok(names)
    }

    #[cfg(not(feature = "ollama"))]
    async fn available_models(&self) -> LecternResult<Vec<String>> {
        Err(self.disabled())
    }

    async fn health_check(&self) -> ProviderHealth {
        match self.available_models().await {
            Ok(_) => ProviderHealth::Healthy,
            Err(e) => ProviderHealth::Unhealthy { message: e.to_string() },
        }
    }
}

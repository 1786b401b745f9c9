//! lectern-llm - AI provider adapters for lectern.
//!
//! Each adapter implements [`lectern_core::Provider`] over one vendor API and
//! classifies failures as transient or permanent so the failover chain can
//! decide between retrying and moving on.
//!
//! # Supported Providers
//!
//! - **OpenAI**, **Groq**, **xAI** and any OpenAI-compatible server (chat completions)
//! - **Anthropic** - Claude via the Messages API
//! - **Gemini** - Google Generative Language API
//! - **Ollama** (feature: `ollama`) - local models
//!
//! # Example
//!
//! ```ignore
//! use lectern_core::{LecternConfig, RateLimitRegistry};
//! use lectern_llm::build_registry;
//!
//! let config = LecternConfig::from_env()?;
//! let limits = RateLimitRegistry::new();
//! let registry = build_registry(&config, &limits)?;
//! ```

mod anthropic;
mod factory;
mod gemini;
mod http;
mod ollama;
mod openai_compat;

pub use anthropic::AnthropicProvider;
pub use factory::{build_registry, ProviderFactory};
pub use gemini::GeminiProvider;
pub use http::ApiKey;
pub use ollama::OllamaProvider;
pub use openai_compat::{default_base_url, OpenAICompatProvider};

// Re-export core types for convenience
pub use lectern_core::config::{ProviderConfig, ProviderKind};
pub use lectern_core::traits::{GenerationOptions, Provider, ProviderResponse};

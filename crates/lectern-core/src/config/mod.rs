//! Configuration system for lectern.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{LecternError, LecternResult};
use crate::retry::RetryPolicy;
use crate::traits::RateLimitPolicy;

/// Provider adapter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderKind {
    #[default]
    OpenAI,
    Anthropic,
    Gemini,
    Groq,
    Xai,
    Ollama,
    /// Any other server speaking the OpenAI chat-completions protocol.
    #[serde(rename = "openai_compatible")]
    #[strum(serialize = "openai_compatible")]
    OpenAICompatible,
}

impl ProviderKind {
    /// Environment variable holding the API key, if this kind uses one.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::Groq => Some("GROQ_API_KEY"),
            Self::Xai => Some("XAI_API_KEY"),
            Self::Ollama | Self::OpenAICompatible => None,
        }
    }

    /// Model used when the configuration does not name one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI | Self::OpenAICompatible => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-sonnet-20241022",
            Self::Gemini => "gemini-1.5-flash",
            Self::Groq => "llama-3.3-70b-versatile",
            Self::Xai => "grok-2-latest",
            Self::Ollama => "llama3.2",
        }
    }

    /// Documented context window for the default models.
    pub fn default_context_tokens(&self) -> u32 {
        match self {
            Self::OpenAI | Self::Xai | Self::Groq => 128_000,
            Self::Anthropic => 200_000,
            Self::Gemini => 1_000_000,
            Self::Ollama | Self::OpenAICompatible => 8_192,
        }
    }
}

/// One configured provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Model name/identifier.
    pub model: String,
    /// API key (if not using environment variable).
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL for API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Context window override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_context_tokens: Option<u32>,
    pub rate_limit: RateLimitPolicy,
    /// Additional models reported by `available_models`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_models: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::for_kind(ProviderKind::default())
    }
}

impl ProviderConfig {
    pub fn for_kind(kind: ProviderKind) -> Self {
        Self {
            kind,
            model: kind.default_model().to_string(),
            api_key: None,
            base_url: None,
            max_context_tokens: None,
            rate_limit: RateLimitPolicy::default(),
            extra_models: Vec::new(),
        }
    }

    /// Builder: set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Builder: set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Builder: set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn context_tokens(&self) -> u32 {
        self.max_context_tokens
            .unwrap_or_else(|| self.kind.default_context_tokens())
    }
}

/// Web enrichment settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub endpoint: String,
    /// Per-lookup timeout (milliseconds).
    pub timeout_ms: u64,
    pub max_snippets: usize,
    pub max_snippet_chars: usize,
    pub max_concurrent_lookups: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.duckduckgo.com/".to_string(),
            timeout_ms: 3_000,
            max_snippets: 3,
            max_snippet_chars: 400,
            max_concurrent_lookups: 4,
        }
    }
}

/// Export settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// External converter program.
    pub compiler: String,
    /// Engine passed to the converter for PDF output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_engine: Option<String>,
    pub compile_timeout_secs: u64,
    /// Copy finished exports here as `<artifact title>.<ext>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            compiler: "pandoc".to_string(),
            pdf_engine: Some("pdflatex".to_string()),
            compile_timeout_secs: 120,
            output_dir: None,
        }
    }
}

impl ExportConfig {
    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }
}

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LecternConfig {
    /// Provider used when a request does not name one.
    pub default_provider: String,
    /// Fallback order used when a request gives none.
    pub fallback_providers: Vec<String>,
    pub max_retries_per_provider: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_jitter: bool,
    /// Fraction of each chunk window repeated at the start of the next.
    pub chunk_overlap_ratio: f32,
    /// Abort the whole artifact when one chunk exhausts every provider.
    pub strict_generation_mode: bool,
    pub max_parallel_chunks: usize,
    /// Per-call provider timeout.
    pub request_timeout_secs: u64,
    pub providers: BTreeMap<String, ProviderConfig>,
    pub enrichment: EnrichmentConfig,
    pub export: ExportConfig,
    pub storage_dir: PathBuf,
}

fn default_storage_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lectern")
}

fn default_providers() -> BTreeMap<String, ProviderConfig> {
    [
        ProviderKind::Groq,
        ProviderKind::Gemini,
        ProviderKind::Anthropic,
        ProviderKind::OpenAI,
    ]
    .into_iter()
    .map(|kind| (kind.to_string(), ProviderConfig::for_kind(kind)))
    .collect()
}

impl Default for LecternConfig {
    fn default() -> Self {
        Self {
            default_provider: "groq".to_string(),
            fallback_providers: vec!["gemini".into(), "anthropic".into(), "openai".into()],
            max_retries_per_provider: 2,
            backoff_base_ms: 500,
            backoff_max_ms: 10_000,
            backoff_jitter: true,
            chunk_overlap_ratio: 0.1,
            strict_generation_mode: false,
            max_parallel_chunks: 4,
            request_timeout_secs: 120,
            providers: default_providers(),
            enrichment: EnrichmentConfig::default(),
            export: ExportConfig::default(),
            storage_dir: default_storage_dir(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> LecternResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| LecternError::Configuration(format!("invalid value for {}: '{}'", name, value)))
}

fn parse_bool(name: &str, value: &str) -> LecternResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(LecternError::Configuration(format!(
            "invalid boolean for {}: '{}'",
            name, value
        ))),
    }
}

impl LecternConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> LecternResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => toml::from_str(&content).map_err(|e| LecternError::Configuration(e.to_string())),
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| LecternError::Configuration(e.to_string()))
            }
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| LecternError::Configuration(e.to_string()))
            }
            _ => Err(LecternError::Configuration(
                "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
            )),
        }
    }

    /// Load configuration from environment variables over the defaults.
    pub fn from_env() -> LecternResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay process environment variables.
    pub fn apply_env(&mut self) -> LecternResult<()> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Overlay variables from `lookup`.
    ///
    /// Recognized: `LECTERN_DEFAULT_PROVIDER`, `LECTERN_FALLBACK_PROVIDERS`
    /// (comma-separated), `LECTERN_MAX_RETRIES`, `LECTERN_BACKOFF_BASE_MS`,
    /// `LECTERN_CHUNK_OVERLAP_RATIO`, `LECTERN_STRICT_MODE`,
    /// `LECTERN_MAX_PARALLEL_CHUNKS`, `LECTERN_REQUEST_TIMEOUT_SECS`,
    /// `LECTERN_STORAGE_DIR`, `LECTERN_COMPILER`, `LECTERN_ENRICHMENT`, and
    /// each provider kind's API key variable.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> LecternResult<()> {
        if let Some(v) = lookup("LECTERN_DEFAULT_PROVIDER") {
            self.default_provider = v.trim().to_string();
        }
        if let Some(v) = lookup("LECTERN_FALLBACK_PROVIDERS") {
            self.fallback_providers = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup("LECTERN_MAX_RETRIES") {
            self.max_retries_per_provider = parse_env("LECTERN_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("LECTERN_BACKOFF_BASE_MS") {
            self.backoff_base_ms = parse_env("LECTERN_BACKOFF_BASE_MS", &v)?;
        }
        if let Some(v) = lookup("LECTERN_CHUNK_OVERLAP_RATIO") {
            self.chunk_overlap_ratio = parse_env("LECTERN_CHUNK_OVERLAP_RATIO", &v)?;
        }
        if let Some(v) = lookup("LECTERN_STRICT_MODE") {
            self.strict_generation_mode = parse_bool("LECTERN_STRICT_MODE", &v)?;
        }
        if let Some(v) = lookup("LECTERN_MAX_PARALLEL_CHUNKS") {
            self.max_parallel_chunks = parse_env("LECTERN_MAX_PARALLEL_CHUNKS", &v)?;
        }
        if let Some(v) = lookup("LECTERN_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env("LECTERN_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("LECTERN_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LECTERN_COMPILER") {
            self.export.compiler = v;
        }
        if let Some(v) = lookup("LECTERN_ENRICHMENT") {
            self.enrichment.enabled = parse_bool("LECTERN_ENRICHMENT", &v)?;
        }

        for provider in self.providers.values_mut() {
            if provider.api_key.is_some() {
                continue;
            }
            if let Some(key) = provider.kind.api_key_env().and_then(&lookup) {
                provider.api_key = Some(key);
            }
        }
        Ok(())
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> LecternConfigBuilder {
        LecternConfigBuilder::default()
    }

    /// Retry policy derived from the backoff settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries_per_provider,
            base_delay_ms: self.backoff_base_ms,
            max_delay_ms: self.backoff_max_ms,
            multiplier: 2.0,
            jitter: self.backoff_jitter,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reject inconsistent values.
    pub fn validate(&self) -> LecternResult<()> {
        if self.default_provider.trim().is_empty() {
            return Err(LecternError::Configuration("default_provider must not be empty".into()));
        }
        if !(0.0..=0.9).contains(&self.chunk_overlap_ratio) {
            return Err(LecternError::Configuration(format!(
                "chunk_overlap_ratio must be within [0, 0.9], got {}",
                self.chunk_overlap_ratio
            )));
        }
        if self.max_parallel_chunks == 0 {
            return Err(LecternError::Configuration("max_parallel_chunks must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(LecternError::Configuration("request_timeout_secs must be at least 1".into()));
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(LecternError::Configuration(
                "backoff_max_ms must not be below backoff_base_ms".into(),
            ));
        }
        if self.export.compiler.trim().is_empty() {
            return Err(LecternError::Configuration("export.compiler must not be empty".into()));
        }
        Ok(())
    }
}

/// Builder for LecternConfig.
#[derive(Default)]
pub struct LecternConfigBuilder {
    config: LecternConfig,
}

impl LecternConfigBuilder {
    /// Set the default provider.
    pub fn default_provider(mut self, id: impl Into<String>) -> Self {
        self.config.default_provider = id.into();
        self
    }

    /// Set the fallback order.
    pub fn fallback_providers(mut self, ids: Vec<String>) -> Self {
        self.config.fallback_providers = ids;
        self
    }

    /// Add or replace a provider.
    pub fn provider(mut self, id: impl Into<String>, config: ProviderConfig) -> Self {
        self.config.providers.insert(id.into(), config);
        self
    }

    /// Set retries per provider.
    pub fn max_retries_per_provider(mut self, retries: u32) -> Self {
        self.config.max_retries_per_provider = retries;
        self
    }

    /// Set backoff delays.
    pub fn backoff(mut self, base_ms: u64, max_ms: u64, jitter: bool) -> Self {
        self.config.backoff_base_ms = base_ms;
        self.config.backoff_max_ms = max_ms;
        self.config.backoff_jitter = jitter;
        self
    }

    /// Set chunk overlap ratio.
    pub fn chunk_overlap_ratio(mut self, ratio: f32) -> Self {
        self.config.chunk_overlap_ratio = ratio;
        self
    }

    /// Set strict generation mode.
    pub fn strict_generation_mode(mut self, strict: bool) -> Self {
        self.config.strict_generation_mode = strict;
        self
    }

    /// Set chunk concurrency.
    pub fn max_parallel_chunks(mut self, n: usize) -> Self {
        self.config.max_parallel_chunks = n;
        self
    }

    /// Set enrichment settings.
    pub fn enrichment(mut self, enrichment: EnrichmentConfig) -> Self {
        self.config.enrichment = enrichment;
        self
    }

    /// Set export settings.
    pub fn export(mut self, export: ExportConfig) -> Self {
        self.config.export = export;
        self
    }

    /// Set storage directory.
    pub fn storage_dir(mut self, path: PathBuf) -> Self {
        self.config.storage_dir = path;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> LecternConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_follow_groq_first_order() {
        let config = LecternConfig::default();
        assert_eq!(config.default_provider, "groq");
        assert_eq!(config.fallback_providers, vec!["gemini", "anthropic", "openai"]);
        assert!(config.providers.contains_key("anthropic"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = [
            ("LECTERN_DEFAULT_PROVIDER", "openai"),
            ("LECTERN_FALLBACK_PROVIDERS", "groq, gemini,"),
            ("LECTERN_STRICT_MODE", "yes"),
            ("LECTERN_CHUNK_OVERLAP_RATIO", "0.25"),
            ("GROQ_API_KEY", "gsk-test"),
        ]
        .into_iter()
        .collect();

        let mut config = LecternConfig::default();
        config
            .apply_env_from(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.fallback_providers, vec!["groq", "gemini"]);
        assert!(config.strict_generation_mode);
        assert_eq!(config.chunk_overlap_ratio, 0.25);
        assert_eq!(config.providers["groq"].api_key.as_deref(), Some("gsk-test"));
        assert!(config.providers["openai"].api_key.is_none());
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = LecternConfig::default();
        let err = config
            .apply_env_from(|name| (name == "LECTERN_MAX_RETRIES").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, LecternError::Configuration(_)));
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lectern.toml");
        std::fs::write(
            &path,
            r#"
default_provider = "anthropic"
max_parallel_chunks = 2

[providers.anthropic]
kind = "anthropic"
model = "claude-3-5-haiku-latest"

[providers.local]
kind = "openai_compatible"
base_url = "http://localhost:8000/v1"

[export]
compiler = "/usr/local/bin/pandoc"
"#,
        )
        .unwrap();

        let config = LecternConfig::from_file(&path).unwrap();
        assert_eq!(config.default_provider, "anthropic");
        assert_eq!(config.max_parallel_chunks, 2);
        assert_eq!(config.providers["anthropic"].model, "claude-3-5-haiku-latest");
        assert_eq!(config.providers["local"].kind, ProviderKind::OpenAICompatible);
        assert_eq!(config.export.compiler, "/usr/local/bin/pandoc");
        assert_eq!(config.export.compile_timeout_secs, 120);
    }

    #[test]
    fn test_validate_rejects_bad_ratio() {
        let config = LecternConfig::builder().chunk_overlap_ratio(0.95).build();
        assert!(config.validate().is_err());
        let config = LecternConfig::builder().max_parallel_chunks(0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("Groq".parse::<ProviderKind>().unwrap(), ProviderKind::Groq);
        assert_eq!("openai_compatible".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAICompatible);
        assert_eq!(ProviderKind::OpenAI.to_string(), "openai");
    }
}

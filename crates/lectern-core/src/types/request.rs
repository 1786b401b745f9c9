//! Generation request types.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::error::{LecternError, LecternResult};

/// Kind of educational artifact to generate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Lecture plan for one class session.
    ClassSession,
    /// Study guide with key concepts and self-assessment.
    StudyGuide,
    /// Slide deck outline.
    Presentation,
    /// Practice worksheet.
    Worksheet,
    /// Quiz or exam.
    Assessment,
}

impl ContentType {
    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ClassSession => "Class session",
            Self::StudyGuide => "Study guide",
            Self::Presentation => "Presentation",
            Self::Worksheet => "Worksheet",
            Self::Assessment => "Assessment",
        }
    }
}

/// Which sections of the syllabus to generate for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SectionTarget {
    #[default]
    All,
    Index(usize),
}

/// Failure handling for chunks that exhaust every provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Abort the whole artifact.
    Strict,
    /// Substitute a `generation_failed` placeholder block and continue.
    BestEffort,
}

/// Provider choice for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSelection {
    /// Primary provider id.
    pub primary: String,
    /// Model override for the primary provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Ordered fallbacks. `None` uses the configured default ordering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallbacks: Option<Vec<String>>,
}

impl ProviderSelection {
    /// Select a primary provider with default fallbacks.
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            model: None,
            fallbacks: None,
        }
    }

    /// Builder: set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Builder: set explicit fallbacks.
    pub fn with_fallbacks(mut self, fallbacks: Vec<String>) -> Self {
        self.fallbacks = Some(fallbacks);
        self
    }

    /// Ordered provider chain, primary first, duplicates removed.
    pub fn chain(&self, default_fallbacks: &[String]) -> Vec<String> {
        let fallbacks = self.fallbacks.as_deref().unwrap_or(default_fallbacks);
        let mut chain: Vec<String> = Vec::with_capacity(fallbacks.len() + 1);
        for id in std::iter::once(&self.primary).chain(fallbacks.iter()) {
            if !chain.contains(id) {
                chain.push(id.clone());
            }
        }
        chain
    }
}

/// Which topics get web enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentScope {
    #[default]
    None,
    AllTopics,
    Topics(BTreeSet<String>),
}

impl EnrichmentScope {
    /// Whether a topic should be looked up.
    pub fn includes(&self, topic: &str) -> bool {
        match self {
            Self::None => false,
            Self::AllTopics => true,
            Self::Topics(topics) => topics.contains(topic),
        }
    }
}

/// Content configuration supplied by the educator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub language: String,
    pub tone: String,
    /// Relative length, 1 to 20.
    pub content_length: u8,
    pub educational_level: String,
    pub pedagogical_approach: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_instructions: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            tone: "formal".to_string(),
            content_length: 5,
            educational_level: "university".to_string(),
            pedagogical_approach: "competency-based".to_string(),
            additional_instructions: None,
        }
    }
}

impl GenerationConfig {
    /// Response token budget derived from the requested length.
    pub fn max_tokens(&self) -> u32 {
        u32::from(self.content_length.clamp(1, 20)) * 400
    }
}

/// One user action asking for generated content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: Uuid,
    pub document_id: Uuid,
    pub content_type: ContentType,
    #[serde(default)]
    pub target: SectionTarget,
    pub providers: ProviderSelection,
    #[serde(default)]
    pub config: GenerationConfig,
    #[serde(default)]
    pub enrichment: EnrichmentScope,
    /// Overrides the configured strict/best-effort mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<GenerationMode>,
}

impl GenerationRequest {
    /// Create a request for all sections of a document.
    pub fn new(document_id: Uuid, content_type: ContentType, providers: ProviderSelection) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            content_type,
            target: SectionTarget::All,
            providers,
            config: GenerationConfig::default(),
            enrichment: EnrichmentScope::None,
            mode: None,
        }
    }

    /// Builder: target one section.
    pub fn with_target(mut self, target: SectionTarget) -> Self {
        self.target = target;
        self
    }

    /// Builder: set content configuration.
    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    /// Builder: set enrichment scope.
    pub fn with_enrichment(mut self, scope: EnrichmentScope) -> Self {
        self.enrichment = scope;
        self
    }

    /// Builder: force a generation mode.
    pub fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Check request-level invariants.
    pub fn validate(&self) -> LecternResult<()> {
        if self.providers.primary.trim().is_empty() {
            return Err(LecternError::validation("primary provider must not be empty"));
        }
        if !(1..=20).contains(&self.config.content_length) {
            return Err(LecternError::validation(format!(
                "content_length must be between 1 and 20, got {}",
                self.config.content_length
            )));
        }
        Ok(())
    }
}

//! Generated content tree.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProviderFailure;
use crate::types::ContentType;

/// Reason recorded on placeholder blocks for chunks that could not be generated.
pub const GENERATION_FAILED: &str = "generation_failed";

/// A typed block of generated content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Heading { level: u8, text: String },
    Paragraph { text: String },
    BulletList { items: Vec<String> },
    Table { header: Vec<String>, rows: Vec<Vec<String>> },
    ImageRef { alt: String, uri: String },
    /// Stands in for a chunk that failed in best-effort mode.
    Placeholder {
        reason: String,
        section: usize,
        chunk: usize,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        detail: String,
    },
}

impl ContentBlock {
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self::Heading {
            level: level.clamp(1, 6),
            text: text.into(),
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::Paragraph { text: text.into() }
    }

    pub fn bullets<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::BulletList {
            items: items.into_iter().map(Into::into).collect(),
        }
    }

    /// Placeholder for a failed chunk.
    pub fn generation_failed(section: usize, chunk: usize, detail: impl Into<String>) -> Self {
        Self::Placeholder {
            reason: GENERATION_FAILED.to_string(),
            section,
            chunk,
            detail: detail.into(),
        }
    }

    /// Block kind name, matching template slot names.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Heading { .. } => "heading",
            Self::Paragraph { .. } => "paragraph",
            Self::BulletList { .. } => "bullet_list",
            Self::Table { .. } => "table",
            Self::ImageRef { .. } => "image",
            Self::Placeholder { .. } => "placeholder",
        }
    }

    /// Plain-text rendering, used by fallback slot rules and content comparison.
    pub fn plain_text(&self) -> String {
        match self {
            Self::Heading { text, .. } | Self::Paragraph { text } => text.clone(),
            Self::BulletList { items } => items.join("\n"),
            Self::Table { header, rows } => std::iter::once(header)
                .chain(rows.iter())
                .map(|row| row.join(" | "))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::ImageRef { alt, uri } => format!("{} ({})", alt, uri),
            Self::Placeholder { reason, section, chunk, .. } => {
                format!("[{}: section {}, chunk {}]", reason, section, chunk)
            }
        }
    }

    /// Kind plus whitespace-collapsed text; two blocks with equal keys are the same content.
    pub fn match_key(&self) -> (&'static str, String) {
        let text = self.plain_text();
        (self.kind(), text.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder { .. })
    }
}

/// Generated content for one syllabus section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSection {
    /// Index of the source syllabus section.
    pub source_index: usize,
    pub title: String,
    pub blocks: Vec<ContentBlock>,
}

/// Which provider produced one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub section: usize,
    pub chunk: usize,
    pub provider: String,
    pub model: String,
    pub latency_ms: u64,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

/// Diagnostics retained from the run that produced an artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Per-topic enrichment outcome; `false` means the lookup failed.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub enriched: BTreeMap<String, bool>,
    /// One record per successfully generated chunk, in (section, chunk) order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<ProviderRecord>,
    /// Failures observed before success or exhaustion, in (section, chunk) order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_failures: Vec<ProviderFailure>,
    /// Extra key/value pairs exposed to templates as `{{meta.<key>}}`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Canonical generated output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentArtifact {
    pub id: Uuid,
    pub document_id: Uuid,
    pub request_id: Uuid,
    pub content_type: ContentType,
    pub title: String,
    pub sections: Vec<ArtifactSection>,
    #[serde(default)]
    pub metadata: ArtifactMetadata,
    pub created_at: DateTime<Utc>,
}

impl ContentArtifact {
    /// All blocks in document order.
    pub fn blocks(&self) -> impl Iterator<Item = &ContentBlock> {
        self.sections.iter().flat_map(|s| s.blocks.iter())
    }

    /// Number of placeholder blocks.
    pub fn failed_chunks(&self) -> usize {
        self.blocks().filter(|b| b.is_placeholder()).count()
    }

    /// Block content stripped of run-specific identifiers, for determinism checks.
    pub fn block_fingerprint(&self) -> Vec<(usize, (&'static str, String))> {
        self.sections
            .iter()
            .flat_map(|s| s.blocks.iter().map(move |b| (s.source_index, b.match_key())))
            .collect()
    }
}

//! Extracted syllabus structure.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::error::{LecternError, LecternResult};

/// Declared input format of an uploaded syllabus.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Text,
}

impl DocumentFormat {
    /// Map a declared MIME type to a format.
    pub fn from_mime(mime_type: &str) -> LecternResult<Self> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Ok(Self::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/docx" => Ok(Self::Docx),
            "text/plain" | "text/markdown" => Ok(Self::Text),
            _ => Err(LecternError::UnsupportedFormat {
                format: mime_type.to_string(),
            }),
        }
    }

    /// Canonical MIME type.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            Self::Text => "text/plain",
        }
    }
}

/// One section of a syllabus (a unit, week, or session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyllabusSection {
    /// Position in the document, starting at 0.
    pub index: usize,
    /// Heading text, or "Untitled" for implicit sections.
    pub title: String,
    /// Topics listed under the heading.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    /// Estimated duration in minutes, when stated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<u32>,
    /// Body text of the section (without the heading line).
    pub body: String,
}

impl SyllabusSection {
    /// Title used for sections with no detectable heading.
    pub const UNTITLED: &'static str = "Untitled";

    /// Create a section with the given title and body.
    pub fn new(index: usize, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            index,
            title: title.into(),
            topics: Vec::new(),
            estimated_minutes: None,
            body: body.into(),
        }
    }

    /// Builder: set topics.
    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.topics = topics;
        self
    }

    /// Builder: set estimated duration.
    pub fn with_minutes(mut self, minutes: u32) -> Self {
        self.estimated_minutes = Some(minutes);
        self
    }

    /// Whether this section was created without a detected heading.
    pub fn is_untitled(&self) -> bool {
        self.title == Self::UNTITLED
    }
}

/// Metadata detected in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyllabusMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub educational_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
}

/// An uploaded syllabus after extraction. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyllabusDocument {
    pub id: Uuid,
    pub format: DocumentFormat,
    /// Raw upload bytes.
    #[serde(skip)]
    pub raw: Vec<u8>,
    /// Normalized full text.
    pub text: String,
    /// Ordered sections. Never empty.
    pub sections: Vec<SyllabusSection>,
    pub metadata: SyllabusMetadata,
    /// True when structured parsing failed and best-effort text was used.
    pub degraded: bool,
}

impl SyllabusDocument {
    /// Display title: detected title, else the first titled section, else "Syllabus".
    pub fn display_title(&self) -> &str {
        self.metadata
            .title
            .as_deref()
            .or_else(|| {
                self.sections
                    .iter()
                    .find(|s| !s.is_untitled())
                    .map(|s| s.title.as_str())
            })
            .unwrap_or("Syllabus")
    }

    /// Lookup a section by position.
    pub fn section(&self, index: usize) -> Option<&SyllabusSection> {
        self.sections.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_mime() {
        assert_eq!(DocumentFormat::from_mime("application/pdf").unwrap(), DocumentFormat::Pdf);
        assert_eq!(
            DocumentFormat::from_mime("text/plain; charset=utf-8").unwrap(),
            DocumentFormat::Text
        );
        assert_eq!(
            DocumentFormat::from_mime(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            )
            .unwrap(),
            DocumentFormat::Docx
        );
        assert!(matches!(
            DocumentFormat::from_mime("image/png"),
            Err(LecternError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_display_title_fallbacks() {
        let mut doc = SyllabusDocument {
            id: Uuid::new_v4(),
            format: DocumentFormat::Text,
            raw: Vec::new(),
            text: String::new(),
            sections: vec![
                SyllabusSection::new(0, SyllabusSection::UNTITLED, "intro"),
                SyllabusSection::new(1, "Unit 1: Cells", "body"),
            ],
            metadata: SyllabusMetadata::default(),
            degraded: false,
        };
        assert_eq!(doc.display_title(), "Unit 1: Cells");
        doc.metadata.title = Some("Biology 101".into());
        assert_eq!(doc.display_title(), "Biology 101");
    }
}

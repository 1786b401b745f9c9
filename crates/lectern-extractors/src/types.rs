//! Core types for content extraction.

use lectern_core::types::DocumentFormat;
use serde::{Deserialize, Serialize};

/// A heading reported by the source format itself (e.g. a DOCX heading style).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingHint {
    pub text: String,
    /// Outline level, 1 for top-level headings.
    pub level: u8,
}

/// Document structure metadata (optional, for structured documents).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStructure {
    /// Total page count (for PDFs).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,

    /// Headings marked by style in the source.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub headings: Vec<HeadingHint>,
}

/// Raw text pulled from one document, before normalization and segmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    /// Extracted text, one logical line per paragraph.
    pub text: String,

    /// Source format.
    pub format: DocumentFormat,

    /// Document structure (if preserved).
    #[serde(default)]
    pub structure: DocumentStructure,
}

impl ExtractedContent {
    /// Create new extracted content.
    pub fn new(text: String, format: DocumentFormat) -> Self {
        Self {
            text,
            format,
            structure: DocumentStructure::default(),
        }
    }

    /// Add structure information.
    pub fn with_structure(mut self, structure: DocumentStructure) -> Self {
        self.structure = structure;
        self
    }

    /// Check if extraction produced meaningful content.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Get content length.
    pub fn len(&self) -> usize {
        self.text.len()
    }
}

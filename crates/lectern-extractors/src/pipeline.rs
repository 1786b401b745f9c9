//! Extraction pipeline: route bytes to a format extractor, then normalize and
//! segment the text into a [`SyllabusDocument`].

use std::sync::Arc;

use lectern_core::error::LecternResult;
use lectern_core::types::{DocumentFormat, SyllabusDocument};
use uuid::Uuid;

use crate::error::{ExtractError, ExtractResult};
use crate::normalize::{fallback_text, normalize};
use crate::sectioner::segment;
use crate::types::ExtractedContent;
use crate::Extractor;

/// Pipeline for extracting content using registered extractors.
///
/// Automatically routes content to the appropriate extractor based on MIME type.
pub struct ExtractionPipeline {
    extractors: Vec<Arc<dyn Extractor>>,
}

impl ExtractionPipeline {
    /// Create new empty pipeline.
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Create pipeline with all available extractors.
    pub fn with_defaults() -> Self {
        Self {
            extractors: crate::ExtractorFactory::all(),
        }
    }

    /// Add an extractor to the pipeline.
    pub fn add_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    /// Extract raw content using the first extractor that handles the MIME type.
    pub async fn extract_content(&self, content: &[u8], mime_type: &str) -> ExtractResult<ExtractedContent> {
        let essence = mime_essence(mime_type);
        for extractor in &self.extractors {
            if extractor.supports(&essence) {
                return extractor.extract(content).await;
            }
        }
        Err(ExtractError::UnsupportedType(mime_type.to_string()))
    }

    /// Extract a structured syllabus.
    ///
    /// Unsupported MIME types and empty input fail. Any other failure of the
    /// format parser falls back to printable text with `degraded` set.
    pub async fn extract(&self, content: &[u8], mime_type: &str) -> LecternResult<SyllabusDocument> {
        let format = DocumentFormat::from_mime(mime_type)?;
        if !self.supports(mime_type) {
            return Err(ExtractError::UnsupportedType(mime_type.to_string()).into());
        }
        if content.iter().all(u8::is_ascii_whitespace) {
            return Err(ExtractError::EmptyContent.into());
        }

        let (text, structure, degraded) = match self.extract_content(content, mime_type).await {
            Ok(extracted) if !extracted.is_empty() => (normalize(&extracted.text), extracted.structure, false),
            Ok(_) => {
                tracing::warn!(format = %format, "Parser returned no text, using plain-text fallback");
                (fallback_text(content), Default::default(), true)
            }
            Err(e) if e.is_structural() => {
                tracing::warn!(format = %format, error = %e, "Parser failed, using plain-text fallback");
                (fallback_text(content), Default::default(), true)
            }
            Err(e) => return Err(e.into()),
        };

        let segmented = segment(&text, &structure.headings);
        let mut metadata = segmented.metadata;
        metadata.page_count = structure.page_count;

        let document = SyllabusDocument {
            id: Uuid::new_v4(),
            format,
            raw: content.to_vec(),
            text,
            sections: segmented.sections,
            metadata,
            degraded,
        };
        tracing::info!(
            document_id = %document.id,
            format = %format,
            sections = document.sections.len(),
            degraded,
            "Extracted syllabus"
        );
        Ok(document)
    }

    /// Check if pipeline can handle a given MIME type.
    pub fn supports(&self, mime_type: &str) -> bool {
        let essence = mime_essence(mime_type);
        self.extractors.iter().any(|e| e.supports(&essence))
    }

    /// List all supported MIME types.
    pub fn supported_types(&self) -> Vec<&str> {
        self.extractors
            .iter()
            .flat_map(|e| e.supported_types().iter().copied())
            .collect()
    }

    /// Get the number of registered extractors.
    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    /// Check if the pipeline has no registered extractors.
    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

impl Default for ExtractionPipeline {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// `text/plain; charset=utf-8` → `text/plain`.
fn mime_essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_core::error::{ErrorCode, LecternError};

    #[test]
    fn test_pipeline_creation() {
        let pipeline = ExtractionPipeline::with_defaults();
        assert!(pipeline.supports("text/plain; charset=utf-8"));

        #[cfg(feature = "pdf")]
        assert!(pipeline.supports("application/pdf"));

        #[cfg(feature = "docx")]
        assert!(pipeline.supports("application/docx"));
    }

    #[test]
    fn test_pipeline_empty() {
        let pipeline = ExtractionPipeline::new();
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.len(), 0);
        assert!(!pipeline.supports("video/mp4"));
    }

    #[tokio::test]
    async fn test_unsupported_type_error() {
        let pipeline = ExtractionPipeline::with_defaults();
        let result = pipeline.extract(b"test", "video/mp4").await;
        assert!(matches!(result, Err(LecternError::UnsupportedFormat { .. })));

        // Known format but no extractor registered for it.
        let result = ExtractionPipeline::new().extract(b"test", "text/plain").await;
        assert!(matches!(result, Err(LecternError::UnsupportedFormat { .. })));
    }

    #[tokio::test]
    async fn test_empty_input_is_extraction_error() {
        let pipeline = ExtractionPipeline::with_defaults();
        for input in [&b""[..], &b"  \n\t "[..]] {
            let err = pipeline.extract(input, "text/plain").await.unwrap_err();
            assert_eq!(err.code(), ErrorCode::ExtEmptyInput);
        }
    }

    #[tokio::test]
    async fn test_invalid_utf8_text_degrades() {
        let pipeline = ExtractionPipeline::with_defaults();
        let mut bytes = b"Week 1: Motion\nTopics: velocity, force\n".to_vec();
        bytes.push(0xff);
        let doc = pipeline.extract(&bytes, "text/plain").await.unwrap();
        assert!(doc.degraded);
        assert_eq!(doc.sections[0].title, "Week 1: Motion");
        assert_eq!(doc.raw, bytes);
    }
}

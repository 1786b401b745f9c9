//! PDF content extraction using pdf-extract.

use crate::error::{ExtractError, ExtractResult};
use crate::types::{DocumentStructure, ExtractedContent};
use crate::Extractor;
use async_trait::async_trait;
use lectern_core::types::DocumentFormat;

const FORM_FEED: char = '\u{000C}';

/// PDF content extractor using pdf-extract library.
///
/// Extracts text from PDF files, wrapping synchronous pdf-extract
/// calls in spawn_blocking to avoid blocking the async runtime.
/// pdf-extract panics on some malformed files; the panic surfaces as a
/// join error, which the pipeline treats like any other parse failure.
#[derive(Debug, Clone)]
pub struct PdfExtractor {
    /// Minimum text length to consider extraction successful
    /// (image-only PDFs yield next to nothing).
    min_text_length: usize,
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfExtractor {
    /// Create new PDF extractor with default settings.
    pub fn new() -> Self {
        Self {
            min_text_length: 10,
        }
    }

    /// Create PDF extractor with custom minimum text threshold.
    pub fn with_min_text_length(min_text_length: usize) -> Self {
        Self { min_text_length }
    }
}

/// Pages are separated by form feeds in the extracted text.
fn count_pages(text: &str) -> Option<usize> {
    let trimmed = text.trim_end_matches(|c: char| c == FORM_FEED || c.is_whitespace());
    let breaks = trimmed.matches(FORM_FEED).count();
    (breaks > 0).then_some(breaks + 1)
}

#[async_trait]
impl Extractor for PdfExtractor {
    async fn extract(&self, content: &[u8]) -> ExtractResult<ExtractedContent> {
        let content = content.to_vec();

        let text = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&content).map_err(|e| ExtractError::Pdf(e.to_string()))
        })
        .await??;

        if text.trim().chars().count() < self.min_text_length {
            return Err(ExtractError::Pdf(format!(
                "extracted text shorter than {} characters",
                self.min_text_length
            )));
        }

        let structure = DocumentStructure {
            page_count: count_pages(&text),
            headings: Vec::new(),
        };
        Ok(ExtractedContent::new(text, DocumentFormat::Pdf).with_structure(structure))
    }

    fn supported_types(&self) -> &[&str] {
        &["application/pdf"]
    }

    fn name(&self) -> &str {
        "pdf-extract"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_pages() {
        assert_eq!(count_pages("one\u{000C}two\u{000C}three\u{000C}\n"), Some(3));
        assert_eq!(count_pages("single page"), None);
    }

    #[tokio::test]
    async fn test_malformed_pdf_is_an_error_not_a_panic() {
        let extractor = PdfExtractor::new();
        let result = extractor.extract(b"%PDF-1.4 truncated garbage").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().is_structural());
    }

    #[test]
    fn test_pdf_extractor_supports() {
        let extractor = PdfExtractor::with_min_text_length(0);
        assert!(extractor.supports("application/pdf"));
        assert!(!extractor.supports("text/plain"));
        assert_eq!(extractor.name(), "pdf-extract");
    }
}

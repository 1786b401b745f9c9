//! Plain text and Markdown input.

use crate::error::ExtractResult;
use crate::types::ExtractedContent;
use crate::Extractor;
use async_trait::async_trait;
use lectern_core::types::DocumentFormat;

const BOM: &str = "\u{FEFF}";

/// Extractor for UTF-8 text. Invalid UTF-8 is a structural failure.
#[derive(Debug, Clone, Default)]
pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for TextExtractor {
    async fn extract(&self, content: &[u8]) -> ExtractResult<ExtractedContent> {
        let text = std::str::from_utf8(content)?;
        let text = text.strip_prefix(BOM).unwrap_or(text);
        Ok(ExtractedContent::new(text.to_string(), DocumentFormat::Text))
    }

    fn supported_types(&self) -> &[&str] {
        &["text/plain", "text/markdown"]
    }

    fn name(&self) -> &str {
        "text"
    }
}

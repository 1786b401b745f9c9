//! lectern-extractors - Syllabus extraction for lectern.
//!
//! Turns an uploaded syllabus (PDF, DOCX or plain text) into a
//! [`lectern_core::SyllabusDocument`]: normalized text split into ordered
//! sections with topics, durations and document metadata.
//!
//! # Features
//!
//! - `pdf` (default) - PDF text extraction via pdf-extract
//! - `docx` (default) - DOCX text extraction via docx-rs
//! - `full` - All extraction features
//!
//! # Example
//!
//! ```ignore
//! use lectern_extractors::SyllabusExtractor;
//!
//! let extractor = SyllabusExtractor::with_defaults();
//! let document = extractor.extract(&pdf_bytes, "application/pdf").await?;
//! for section in &document.sections {
//!     println!("{}: {:?}", section.title, section.topics);
//! }
//! ```

mod error;
mod factory;
mod normalize;
mod pipeline;
mod sectioner;
mod text;
mod types;

#[cfg(feature = "pdf")]
mod pdf;

#[cfg(feature = "docx")]
mod docx;

pub use error::{ExtractError, ExtractResult};
pub use factory::ExtractorFactory;
pub use normalize::{fallback_text, normalize};
pub use pipeline::ExtractionPipeline;
pub use sectioner::{segment, Segmented};
pub use text::TextExtractor;
pub use types::{DocumentStructure, ExtractedContent, HeadingHint};

/// The syllabus extractor is the default pipeline.
pub type SyllabusExtractor = ExtractionPipeline;

#[cfg(feature = "pdf")]
pub use pdf::PdfExtractor;

#[cfg(feature = "docx")]
pub use docx::DocxExtractor;

use async_trait::async_trait;

/// Core Extractor trait - all format extractors implement this.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract raw text content from bytes.
    async fn extract(&self, content: &[u8]) -> ExtractResult<ExtractedContent>;

    /// Supported MIME types for this extractor.
    fn supported_types(&self) -> &[&str];

    /// Check if this extractor handles the given MIME type.
    fn supports(&self, mime_type: &str) -> bool {
        self.supported_types().contains(&mime_type)
    }

    /// Human-readable name for this extractor.
    fn name(&self) -> &str;
}

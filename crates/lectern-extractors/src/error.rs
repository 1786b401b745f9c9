//! Extraction error types.

use lectern_core::error::{ErrorCode, LecternError};
use thiserror::Error;

/// Errors that can occur during content extraction.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Content type is not supported by any extractor.
    #[error("Unsupported content type: {0}")]
    UnsupportedType(String),

    /// Input bytes were empty or whitespace only.
    #[error("Empty content extracted")]
    EmptyContent,

    /// Text input was not valid UTF-8.
    #[error("Invalid text encoding: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// PDF-specific extraction error.
    #[cfg(feature = "pdf")]
    #[error("PDF extraction error: {0}")]
    Pdf(String),

    /// DOCX-specific extraction error.
    #[cfg(feature = "docx")]
    #[error("DOCX extraction error: {0}")]
    Docx(String),

    /// Task join error from spawn_blocking (includes parser panics).
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl ExtractError {
    /// Whether the plain-text fallback may recover from this error.
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::UnsupportedType(_) | Self::EmptyContent)
    }
}

impl From<ExtractError> for LecternError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::UnsupportedType(format) => LecternError::UnsupportedFormat { format },
            ExtractError::EmptyContent => LecternError::Extraction {
                message: "document is empty".to_string(),
                code: ErrorCode::ExtEmptyInput,
            },
            other => LecternError::extraction(other.to_string()),
        }
    }
}

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;

//! Error types for lectern operations.
//!
//! This module provides the error hierarchy shared by every pipeline stage,
//! with structured error codes, suggestions for resolution, and the
//! transient/permanent split that drives provider retries.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for lectern operations.
pub type LecternResult<T> = Result<T, LecternError>;

/// Classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Timeout, rate limit, 5xx. Retried on the same provider.
    Transient,
    /// Auth error, invalid model, content-policy rejection. Advances immediately.
    Permanent,
}

/// One provider's failure inside a failover run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    /// Provider identifier.
    pub provider: String,
    /// Transient or permanent.
    pub kind: FailureKind,
    /// Last error message observed for this provider.
    pub message: String,
    /// Number of attempts made against this provider.
    pub attempts: u32,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, {} attempt{}): {}",
            self.provider,
            self.kind,
            self.attempts,
            if self.attempts == 1 { "" } else { "s" },
            self.message
        )
    }
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Main error type for all lectern operations.
#[derive(Error, Debug)]
pub enum LecternError {
    /// Declared document format is not handled by any extractor.
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    /// Document extraction failed and no degraded fallback was possible.
    #[error("Extraction error: {message}")]
    Extraction { message: String, code: ErrorCode },

    /// Provider failed in a way that may succeed on retry.
    #[error("Provider {provider} transient error: {message}")]
    ProviderTransient {
        provider: String,
        message: String,
        code: ErrorCode,
        retry_after: Option<Duration>,
    },

    /// Provider failed in a way that retrying will not fix.
    #[error("Provider {provider} permanent error: {message}")]
    ProviderPermanent {
        provider: String,
        message: String,
        code: ErrorCode,
    },

    /// Every provider in the failover chain failed.
    #[error("All providers exhausted: {}", join_failures(.failures))]
    AllProvidersExhausted { failures: Vec<ProviderFailure> },

    /// A chunk failed in strict generation mode.
    #[error("Generation failed for section {section}, chunk {chunk}: {source}")]
    ChunkFailed {
        section: usize,
        chunk: usize,
        #[source]
        source: Box<LecternError>,
    },

    /// Template slot rules do not fit the artifact or skeleton.
    #[error("Template slot mismatch in '{template}': {message}")]
    TemplateSlotMismatch { template: String, message: String },

    /// External document compiler exited unsuccessfully.
    #[error("External compiler error ({format}): exit {exit_code:?}: {stderr}")]
    ExternalCompiler {
        format: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The request was cancelled by the caller.
    #[error("Cancellation requested")]
    Cancelled,

    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        details: HashMap<String, String>,
    },

    /// Entity not found in the store.
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        code: ErrorCode,
        id: Option<String>,
    },

    /// Persistence layer failure.
    #[error("Storage error: {message}")]
    Storage { message: String, code: ErrorCode },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Provider not supported.
    #[error("Provider not supported: {provider}")]
    UnsupportedProvider { provider: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Extraction (EXT_xxx)
    ExtEmptyInput,
    ExtParseFailed,

    // Provider (PRV_xxx)
    PrvTimeout,
    PrvRateLimited,
    PrvServerError,
    PrvConnectionFailed,
    PrvInvalidResponse,
    PrvAuthFailed,
    PrvInvalidModel,
    PrvContentPolicy,
    PrvBadRequest,

    // Validation (VAL_xxx)
    ValInvalidInput,
    ValOutOfRange,

    // Export (EXP_xxx)
    ExpSlotMismatch,
    ExpCompilerFailed,

    // Storage (STO_xxx)
    StoNotFound,
    StoWriteFailed,
    StoImmutable,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ExtEmptyInput => "EXT_001",
            ErrorCode::ExtParseFailed => "EXT_002",
            ErrorCode::PrvTimeout => "PRV_001",
            ErrorCode::PrvRateLimited => "PRV_002",
            ErrorCode::PrvServerError => "PRV_003",
            ErrorCode::PrvConnectionFailed => "PRV_004",
            ErrorCode::PrvInvalidResponse => "PRV_005",
            ErrorCode::PrvAuthFailed => "PRV_101",
            ErrorCode::PrvInvalidModel => "PRV_102",
            ErrorCode::PrvContentPolicy => "PRV_103",
            ErrorCode::PrvBadRequest => "PRV_104",
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValOutOfRange => "VAL_002",
            ErrorCode::ExpSlotMismatch => "EXP_001",
            ErrorCode::ExpCompilerFailed => "EXP_002",
            ErrorCode::StoNotFound => "STO_001",
            ErrorCode::StoWriteFailed => "STO_002",
            ErrorCode::StoImmutable => "STO_003",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl LecternError {
    /// Create an extraction error.
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
            code: ErrorCode::ExtParseFailed,
        }
    }

    /// Create a transient provider error.
    pub fn transient(provider: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::ProviderTransient {
            provider: provider.into(),
            message: message.into(),
            code,
            retry_after: None,
        }
    }

    /// Create a permanent provider error.
    pub fn permanent(provider: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::ProviderPermanent {
            provider: provider.into(),
            message: message.into(),
            code,
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            details: HashMap::new(),
        }
    }

    /// Create a not found error.
    pub fn not_found(kind: &str, id: impl Into<String>) -> Self {
        let id = id.into();
        Self::NotFound {
            message: format!("{} with id '{}' not found", kind, id),
            code: ErrorCode::StoNotFound,
            id: Some(id),
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            code: ErrorCode::StoWriteFailed,
        }
    }

    /// Create a template slot mismatch error.
    pub fn slot_mismatch(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TemplateSlotMismatch {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Whether this error should be retried on the same provider.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ProviderTransient { .. })
    }

    /// Failure classification for provider errors. Anything that is not an
    /// explicit transient failure is treated as permanent.
    pub fn failure_kind(&self) -> FailureKind {
        if self.is_transient() {
            FailureKind::Transient
        } else {
            FailureKind::Permanent
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Extraction { code, .. } => *code,
            Self::ProviderTransient { code, .. } => *code,
            Self::ProviderPermanent { code, .. } => *code,
            Self::Validation { code, .. } => *code,
            Self::NotFound { code, .. } => *code,
            Self::Storage { code, .. } => *code,
            Self::TemplateSlotMismatch { .. } => ErrorCode::ExpSlotMismatch,
            Self::ExternalCompiler { .. } => ErrorCode::ExpCompilerFailed,
            _ => ErrorCode::Internal,
        }
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::UnsupportedFormat { .. } => Some("Upload a PDF, DOCX or plain text syllabus"),
            Self::ProviderPermanent {
                code: ErrorCode::PrvAuthFailed,
                ..
            } => Some("Please check the provider API key"),
            Self::ProviderPermanent {
                code: ErrorCode::PrvInvalidModel,
                ..
            } => Some("Please check the model identifier for this provider"),
            Self::AllProvidersExhausted { .. } => {
                Some("Configure additional fallback providers or retry later")
            }
            Self::TemplateSlotMismatch { .. } => {
                Some("Check the template's slot names and placeholder variables")
            }
            Self::ExternalCompiler { .. } => {
                Some("Please check that the document compiler is installed and on PATH")
            }
            _ => None,
        }
    }

    /// Classify an HTTP status returned by a provider.
    pub fn from_http_status(provider: &str, status: u16, body: &str) -> Self {
        let lower = body.to_lowercase();
        match status {
            401 | 403 => Self::permanent(provider, ErrorCode::PrvAuthFailed, body),
            404 => Self::permanent(provider, ErrorCode::PrvInvalidModel, body),
            408 => Self::transient(provider, ErrorCode::PrvTimeout, body),
            429 => Self::transient(provider, ErrorCode::PrvRateLimited, body),
            500..=599 => Self::transient(
                provider,
                ErrorCode::PrvServerError,
                format!("HTTP {}: {}", status, body),
            ),
            _ if lower.contains("content policy")
                || lower.contains("content_policy")
                || lower.contains("safety")
                || lower.contains("content_filter") =>
            {
                Self::permanent(provider, ErrorCode::PrvContentPolicy, body)
            }
            _ if lower.contains("model") && (lower.contains("not found") || lower.contains("does not exist")) => {
                Self::permanent(provider, ErrorCode::PrvInvalidModel, body)
            }
            _ => Self::permanent(
                provider,
                ErrorCode::PrvBadRequest,
                format!("HTTP {}: {}", status, body),
            ),
        }
    }

    /// Attach a `Retry-After` hint to a transient error.
    pub fn with_retry_after(self, delay: Option<Duration>) -> Self {
        match self {
            Self::ProviderTransient {
                provider,
                message,
                code,
                ..
            } => Self::ProviderTransient {
                provider,
                message,
                code,
                retry_after: delay,
            },
            other => other,
        }
    }
}

impl From<reqwest::Error> for LecternError {
    fn from(err: reqwest::Error) -> Self {
        let provider = err
            .url()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string());
        if err.is_timeout() {
            Self::transient(provider, ErrorCode::PrvTimeout, err.to_string())
        } else if err.is_connect() || err.is_request() {
            Self::transient(provider, ErrorCode::PrvConnectionFailed, err.to_string())
        } else if err.is_decode() {
            Self::transient(provider, ErrorCode::PrvInvalidResponse, err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_http_status(&provider, status.as_u16(), &err.to_string())
        } else {
            Self::transient(provider, ErrorCode::PrvConnectionFailed, err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_classification() {
        assert!(LecternError::from_http_status("groq", 429, "slow down").is_transient());
        assert!(LecternError::from_http_status("groq", 503, "unavailable").is_transient());
        assert!(LecternError::from_http_status("groq", 408, "timeout").is_transient());

        let auth = LecternError::from_http_status("groq", 401, "bad key");
        assert!(!auth.is_transient());
        assert_eq!(auth.code(), ErrorCode::PrvAuthFailed);

        let model = LecternError::from_http_status("openai", 400, "The model `gpt-9` does not exist");
        assert_eq!(model.code(), ErrorCode::PrvInvalidModel);

        let policy = LecternError::from_http_status("openai", 400, "rejected by content_policy");
        assert_eq!(policy.code(), ErrorCode::PrvContentPolicy);
        assert_eq!(policy.failure_kind(), FailureKind::Permanent);
    }

    #[test]
    fn test_exhausted_message_lists_every_provider() {
        let err = LecternError::AllProvidersExhausted {
            failures: vec![
                ProviderFailure {
                    provider: "groq".into(),
                    kind: FailureKind::Transient,
                    message: "HTTP 503".into(),
                    attempts: 3,
                },
                ProviderFailure {
                    provider: "gemini".into(),
                    kind: FailureKind::Permanent,
                    message: "bad key".into(),
                    attempts: 1,
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("groq (Transient, 3 attempts)"));
        assert!(text.contains("gemini (Permanent, 1 attempt)"));
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::PrvRateLimited.as_str(), "PRV_002");
        assert_eq!(ErrorCode::StoImmutable.as_str(), "STO_003");
    }

    #[test]
    fn test_retry_after_only_applies_to_transient() {
        let err = LecternError::transient("x", ErrorCode::PrvRateLimited, "429")
            .with_retry_after(Some(Duration::from_secs(2)));
        assert!(matches!(
            err,
            LecternError::ProviderTransient { retry_after: Some(d), .. } if d == Duration::from_secs(2)
        ));

        let err = LecternError::Cancelled.with_retry_after(Some(Duration::from_secs(2)));
        assert!(matches!(err, LecternError::Cancelled));
    }
}

//! Export error types.

use lectern_core::error::LecternError;
use thiserror::Error;

/// Errors raised while rendering or compiling an export.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Template slots, variables or skeleton do not fit together.
    #[error("Template '{template}': {message}")]
    SlotMismatch { template: String, message: String },

    /// The compiler ran and failed, or could not be started.
    #[error("Compiler failed for {format}: exit {exit_code:?}: {stderr}")]
    Compiler {
        format: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The compiler did not finish within its time budget.
    #[error("Compiler timed out for {format} after {secs}s")]
    Timeout { format: String, secs: u64 },

    /// An export setting is not a value LaTeX accepts.
    #[error("Invalid export setting: {0}")]
    InvalidSettings(String),

    /// A template asset name would escape the compile directory.
    #[error("Invalid asset name: {0}")]
    InvalidAsset(String),

    #[error("Export cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    pub fn slot_mismatch(template: &str, message: impl Into<String>) -> Self {
        Self::SlotMismatch {
            template: template.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

impl From<ExportError> for LecternError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::SlotMismatch { template, message } => LecternError::slot_mismatch(template, message),
            ExportError::Compiler {
                format,
                exit_code,
                stderr,
            } => LecternError::ExternalCompiler {
                format,
                exit_code,
                stderr,
            },
            ExportError::Timeout { format, secs } => LecternError::ExternalCompiler {
                format,
                exit_code: None,
                stderr: format!("timed out after {}s", secs),
            },
            ExportError::InvalidSettings(detail) => LecternError::validation(format!("invalid export setting: {}", detail)),
            ExportError::InvalidAsset(name) => LecternError::validation(format!("invalid template asset name '{}'", name)),
            ExportError::Cancelled => LecternError::Cancelled,
            ExportError::Io(e) => LecternError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_core::error::ErrorCode;

    #[test]
    fn test_conversion_keeps_stderr() {
        let err: LecternError = ExportError::Compiler {
            format: "pdf".into(),
            exit_code: Some(43),
            stderr: "! Undefined control sequence.".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::ExpCompilerFailed);
        assert!(err.to_string().contains("Undefined control sequence"));

        let err: LecternError = ExportError::Timeout {
            format: "docx".into(),
            secs: 5,
        }
        .into();
        assert!(matches!(err, LecternError::ExternalCompiler { exit_code: None, .. }));
    }
}

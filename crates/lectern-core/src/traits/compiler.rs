//! Document compiler trait.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::LecternResult;
use crate::types::{ExportFormat, TemplateAsset};

/// Converts intermediate LaTeX markup into a target format.
#[async_trait]
pub trait DocumentCompiler: Send + Sync {
    /// Compiler name used in logs.
    fn name(&self) -> &str;

    /// Compile `markup` into `format`. Assets are made available next to the markup.
    ///
    /// Must stop work and return `LecternError::Cancelled` when `cancel` fires.
    async fn compile(
        &self,
        markup: &str,
        assets: &[TemplateAsset],
        format: ExportFormat,
        cancel: &CancellationToken,
    ) -> LecternResult<Vec<u8>>;
}

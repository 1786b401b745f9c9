//! Persistence trait for documents, artifacts, templates and rendered files.

use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::LecternResult;
use crate::types::{ContentArtifact, ExportFormat, SyllabusDocument, Template};

/// Storage for pipeline entities.
///
/// Documents and artifacts are written once under stable ids. A template
/// version becomes immutable after `lock_template`; saving different content
/// under a locked `id@version` fails with `STO_003`.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn save_document(&self, document: &SyllabusDocument) -> LecternResult<()>;

    async fn load_document(&self, id: Uuid) -> LecternResult<SyllabusDocument>;

    async fn save_artifact(&self, artifact: &ContentArtifact) -> LecternResult<()>;

    async fn load_artifact(&self, id: Uuid) -> LecternResult<ContentArtifact>;

    /// Artifact ids, oldest first.
    async fn list_artifacts(&self) -> LecternResult<Vec<Uuid>>;

    async fn save_template(&self, template: &Template) -> LecternResult<()>;

    /// Load a template version, or the highest stored version when `version` is `None`.
    async fn load_template(&self, id: &str, version: Option<u32>) -> LecternResult<Template>;

    async fn lock_template(&self, id: &str, version: u32) -> LecternResult<()>;

    async fn is_template_locked(&self, id: &str, version: u32) -> LecternResult<bool>;

    /// Path of a previously rendered output, if present.
    async fn find_export(&self, content_hash: &str, format: ExportFormat) -> LecternResult<Option<PathBuf>>;

    /// Atomically persist a rendered output and return its path.
    async fn put_export(
        &self,
        content_hash: &str,
        format: ExportFormat,
        bytes: &[u8],
    ) -> LecternResult<PathBuf>;
}

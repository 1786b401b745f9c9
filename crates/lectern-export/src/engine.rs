//! Export jobs: render once, convert per format, cache by content hash.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lectern_core::error::{LecternError, LecternResult};
use lectern_core::store::write_atomic;
use lectern_core::traits::{ArtifactStore, DocumentCompiler};
use lectern_core::types::{
    ArtifactMetadata, ArtifactSection, ContentArtifact, ContentBlock, ExportFormat, ExportJob, ExportReport,
    ExportSettings, FormatStatus, Template,
};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::builtin::builtin;
use crate::render::render_markup;

/// Cache key for one rendered output: sha256 over the artifact JSON, the
/// template id and version, the effective settings, and the format.
pub fn content_hash(
    artifact: &ContentArtifact,
    template: &Template,
    settings: &ExportSettings,
    format: ExportFormat,
) -> LecternResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(artifact)?);
    hasher.update([0u8]);
    hasher.update(template.id.as_bytes());
    hasher.update([0u8]);
    hasher.update(template.version.to_le_bytes());
    hasher.update(serde_json::to_vec(settings)?);
    hasher.update(format.extension().as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Keep file names to letters, digits, `-` and `_`.
fn file_stem(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        "export".to_string()
    } else {
        stem.chars().take(80).collect()
    }
}

/// Merge several artifacts into one, in order, under `title`.
///
/// Each part becomes one section headed by its title; the part's own section
/// titles become level-1 headings and its headings move one level down. The
/// merged id is derived from the part ids so repeated merges hit the cache.
pub fn combine_artifacts(parts: &[ContentArtifact], title: &str) -> LecternResult<ContentArtifact> {
    let first = parts
        .first()
        .ok_or_else(|| LecternError::validation("combined export needs at least one artifact"))?;

    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    for part in parts {
        hasher.update(part.id.as_bytes());
    }
    let digest = hasher.finalize();
    let mut id = [0u8; 16];
    id.copy_from_slice(&digest[..16]);

    let mut extra = BTreeMap::new();
    let sections = parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            for (k, v) in &part.metadata.extra {
                extra.entry(k.clone()).or_insert_with(|| v.clone());
            }
            let mut blocks = Vec::new();
            for section in &part.sections {
                blocks.push(ContentBlock::heading(1, section.title.clone()));
                blocks.extend(section.blocks.iter().map(|block| match block {
                    ContentBlock::Heading { level, text } => ContentBlock::heading(level + 1, text.clone()),
                    other => other.clone(),
                }));
            }
            ArtifactSection {
                source_index: i,
                title: part.title.clone(),
                blocks,
            }
        })
        .collect();

    Ok(ContentArtifact {
        id: Uuid::from_bytes(id),
        document_id: first.document_id,
        request_id: Uuid::nil(),
        content_type: first.content_type,
        title: title.to_string(),
        sections,
        metadata: ArtifactMetadata {
            extra,
            ..Default::default()
        },
        created_at: parts.iter().map(|p| p.created_at).max().unwrap_or(first.created_at),
    })
}

/// Renders artifacts and persists the outputs through an [`ArtifactStore`].
pub struct ExportEngine {
    store: Arc<dyn ArtifactStore>,
    compiler: Arc<dyn DocumentCompiler>,
    output_dir: Option<PathBuf>,
}

impl ExportEngine {
    pub fn new(store: Arc<dyn ArtifactStore>, compiler: Arc<dyn DocumentCompiler>) -> Self {
        Self {
            store,
            compiler,
            output_dir: None,
        }
    }

    /// Also copy finished outputs to `dir` as `<artifact title>.<ext>`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Render one artifact into one format with the template's default
    /// settings, without touching the store.
    pub async fn render(
        &self,
        artifact: &ContentArtifact,
        template: &Template,
        format: ExportFormat,
        cancel: &CancellationToken,
    ) -> LecternResult<Vec<u8>> {
        let markup = render_markup(artifact, template, &template.default_settings)?;
        self.convert(&markup, template, format, cancel).await
    }

    async fn convert(
        &self,
        markup: &str,
        template: &Template,
        format: ExportFormat,
        cancel: &CancellationToken,
    ) -> LecternResult<Vec<u8>> {
        if !format.needs_compiler() {
            return Ok(markup.as_bytes().to_vec());
        }
        self.compiler.compile(markup, &template.assets, format, cancel).await
    }

    /// Resolve a template from the store, falling back to the built-ins.
    pub async fn template(&self, id: &str, version: Option<u32>) -> LecternResult<Template> {
        match self.store.load_template(id, version).await {
            Ok(template) => Ok(template),
            Err(LecternError::NotFound { .. }) => builtin(id)
                .filter(|t| version.map_or(true, |v| v == t.version))
                .ok_or_else(|| LecternError::not_found("Template", id)),
            Err(e) => Err(e),
        }
    }

    /// Run a stored job: load its artifact and template, then export.
    pub async fn run_job(&self, job: &ExportJob, cancel: &CancellationToken) -> LecternResult<ExportReport> {
        let artifact = self.store.load_artifact(job.artifact_id).await?;
        let template = self
            .template(&job.template_id, Some(job.template_version))
            .await?;
        self.export_with_job(job.clone(), &artifact, &template, cancel).await
    }

    /// Export `artifact` into every format in `formats` with the template's
    /// default settings.
    ///
    /// The markup is rendered once. A format that fails is recorded in the
    /// report and does not stop the others. Template problems fail the whole
    /// job before any conversion.
    pub async fn export(
        &self,
        artifact: &ContentArtifact,
        template: &Template,
        formats: &[ExportFormat],
        cancel: &CancellationToken,
    ) -> LecternResult<ExportReport> {
        self.export_with_settings(artifact, template, formats, None, cancel).await
    }

    /// Like [`export`](Self::export), with `settings` overriding the
    /// template's defaults when given.
    pub async fn export_with_settings(
        &self,
        artifact: &ContentArtifact,
        template: &Template,
        formats: &[ExportFormat],
        settings: Option<ExportSettings>,
        cancel: &CancellationToken,
    ) -> LecternResult<ExportReport> {
        let job = ExportJob::new(artifact.id, template.id.clone(), template.version, formats.to_vec())
            .with_settings(settings);
        self.export_with_job(job, artifact, template, cancel).await
    }

    /// Merge `parts` under `title` and export the result.
    ///
    /// Without explicit `settings` the template defaults apply with a table
    /// of contents turned on.
    pub async fn export_combined(
        &self,
        parts: &[ContentArtifact],
        title: &str,
        template: &Template,
        formats: &[ExportFormat],
        settings: Option<ExportSettings>,
        cancel: &CancellationToken,
    ) -> LecternResult<ExportReport> {
        let combined = combine_artifacts(parts, title)?;
        let settings = settings.unwrap_or_else(|| template.default_settings.clone().with_table_of_contents(true));
        self.export_with_settings(&combined, template, formats, Some(settings), cancel)
            .await
    }

    async fn export_with_job(
        &self,
        job: ExportJob,
        artifact: &ContentArtifact,
        template: &Template,
        cancel: &CancellationToken,
    ) -> LecternResult<ExportReport> {
        if job.formats.is_empty() {
            return Err(LecternError::validation("export job has no target formats"));
        }
        let settings = job
            .settings
            .clone()
            .unwrap_or_else(|| template.default_settings.clone());
        let markup = render_markup(artifact, template, &settings)?;
        // Fails when this id@version is locked with different content.
        self.store.save_template(template).await?;

        tracing::info!(
            job_id = %job.id,
            artifact_id = %artifact.id,
            template = %template.version_key(),
            formats = job.formats.len(),
            "Starting export job"
        );

        let mut statuses = BTreeMap::new();
        for &format in &job.formats {
            if cancel.is_cancelled() {
                return Err(LecternError::Cancelled);
            }
            let status = match self
                .export_format(artifact, template, &settings, &markup, format, cancel)
                .await
            {
                Ok(status) => status,
                Err(LecternError::Cancelled) => return Err(LecternError::Cancelled),
                Err(e) => {
                    tracing::warn!(job_id = %job.id, format = %format, error = %e, "Export format failed");
                    FormatStatus::Failed {
                        code: e.code().as_str().to_string(),
                        message: e.to_string(),
                    }
                }
            };
            statuses.insert(format, status);
        }

        let report = ExportReport { job, statuses };
        if report.any_completed() {
            self.store.lock_template(&template.id, template.version).await?;
        }
        tracing::info!(
            job_id = %report.job.id,
            completed = report.statuses.values().filter(|s| s.is_completed()).count(),
            cached = report.statuses.values().filter(|s| s.is_cached()).count(),
            "Finished export job"
        );
        Ok(report)
    }

    async fn export_format(
        &self,
        artifact: &ContentArtifact,
        template: &Template,
        settings: &ExportSettings,
        markup: &str,
        format: ExportFormat,
        cancel: &CancellationToken,
    ) -> LecternResult<FormatStatus> {
        let hash = content_hash(artifact, template, settings, format)?;

        if let Some(path) = self.store.find_export(&hash, format).await? {
            tracing::debug!(format = %format, hash = %hash, "Export served from cache");
            let size_bytes = tokio::fs::metadata(&path).await?.len();
            self.copy_out(&path, &artifact.title, format).await?;
            return Ok(FormatStatus::Completed {
                path,
                content_hash: hash,
                size_bytes,
                cached: true,
            });
        }

        let bytes = self.convert(markup, template, format, cancel).await?;
        let path = self.store.put_export(&hash, format, &bytes).await?;
        self.copy_out(&path, &artifact.title, format).await?;
        Ok(FormatStatus::Completed {
            path,
            content_hash: hash,
            size_bytes: bytes.len() as u64,
            cached: false,
        })
    }

    async fn copy_out(&self, path: &Path, title: &str, format: ExportFormat) -> LecternResult<()> {
        let Some(dir) = &self.output_dir else {
            return Ok(());
        };
        let target = dir.join(format!("{}.{}", file_stem(title), format.extension()));
        let bytes = tokio::fs::read(path).await?;
        write_atomic(&target, bytes).await
    }
}

//! Filesystem-backed store.
//!
//! Layout under the root directory:
//!
//! ```text
//! documents/<uuid>.json    documents/<uuid>.raw
//! artifacts/<uuid>.json
//! templates/<id>/<version>.json    templates/<id>/<version>.lock
//! exports/<sha256>.<ext>
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ErrorCode, LecternError, LecternResult};
use crate::traits::ArtifactStore;
use crate::types::{ContentArtifact, ExportFormat, SyllabusDocument, Template};

/// Store writing JSON entities and rendered files below one directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

/// Write `bytes` to `target` via a temp file in the same directory and a rename.
pub async fn write_atomic(target: &Path, bytes: Vec<u8>) -> LecternResult<()> {
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = target
            .parent()
            .ok_or_else(|| LecternError::storage(format!("no parent directory for {}", target.display())))?;
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target)
            .map_err(|e| LecternError::storage(format!("failed to persist {}: {}", target.display(), e.error)))?;
        Ok(())
    })
    .await
    .map_err(|e| LecternError::Internal(format!("write task failed: {}", e)))?
}

fn check_template_id(id: &str) -> LecternResult<()> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(LecternError::validation(format!("invalid template id '{}'", id)))
    }
}

impl FsStore {
    /// Open a store rooted at `root`, creating the directory layout.
    pub async fn open(root: impl Into<PathBuf>) -> LecternResult<Self> {
        let root = root.into();
        for sub in ["documents", "artifacts", "templates", "exports"] {
            tokio::fs::create_dir_all(root.join(sub)).await?;
        }
        tracing::debug!(root = %root.display(), "Opened filesystem store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, id: Uuid) -> PathBuf {
        self.root.join("documents").join(format!("{}.json", id))
    }

    fn raw_path(&self, id: Uuid) -> PathBuf {
        self.root.join("documents").join(format!("{}.raw", id))
    }

    fn artifact_path(&self, id: Uuid) -> PathBuf {
        self.root.join("artifacts").join(format!("{}.json", id))
    }

    fn template_dir(&self, id: &str) -> PathBuf {
        self.root.join("templates").join(id)
    }

    fn template_path(&self, id: &str, version: u32) -> PathBuf {
        self.template_dir(id).join(format!("{}.json", version))
    }

    fn lock_path(&self, id: &str, version: u32) -> PathBuf {
        self.template_dir(id).join(format!("{}.lock", version))
    }

    /// Path a rendered output is stored at.
    pub fn export_path(&self, content_hash: &str, format: ExportFormat) -> PathBuf {
        self.root
            .join("exports")
            .join(format!("{}.{}", content_hash, format.extension()))
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> LecternResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        write_atomic(path, bytes).await
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path, kind: &str, id: &str) -> LecternResult<T> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(LecternError::not_found(kind, id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn template_versions(&self, id: &str) -> LecternResult<Vec<u32>> {
        let dir = self.template_dir(id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(v) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u32>().ok())
            {
                versions.push(v);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }
}

#[async_trait]
impl ArtifactStore for FsStore {
    async fn save_document(&self, document: &SyllabusDocument) -> LecternResult<()> {
        write_atomic(&self.raw_path(document.id), document.raw.clone()).await?;
        self.write_json(&self.document_path(document.id), document).await
    }

    async fn load_document(&self, id: Uuid) -> LecternResult<SyllabusDocument> {
        let mut document: SyllabusDocument = self
            .read_json(&self.document_path(id), "Document", &id.to_string())
            .await?;
        document.raw = match tokio::fs::read(self.raw_path(id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(document)
    }

    async fn save_artifact(&self, artifact: &ContentArtifact) -> LecternResult<()> {
        self.write_json(&self.artifact_path(artifact.id), artifact).await?;
        tracing::info!(artifact_id = %artifact.id, sections = artifact.sections.len(), "Saved artifact");
        Ok(())
    }

    async fn load_artifact(&self, id: Uuid) -> LecternResult<ContentArtifact> {
        self.read_json(&self.artifact_path(id), "Artifact", &id.to_string())
            .await
    }

    async fn list_artifacts(&self) -> LecternResult<Vec<Uuid>> {
        let mut entries = tokio::fs::read_dir(self.root.join("artifacts")).await?;
        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                continue;
            };
            let artifact = self.load_artifact(id).await?;
            found.push((artifact.created_at, id));
        }
        found.sort();
        Ok(found.into_iter().map(|(_, id)| id).collect())
    }

    async fn save_template(&self, template: &Template) -> LecternResult<()> {
        check_template_id(&template.id)?;
        if self.is_template_locked(&template.id, template.version).await? {
            let existing = self.load_template(&template.id, Some(template.version)).await?;
            if existing.content_digest() != template.content_digest() {
                return Err(LecternError::Storage {
                    message: format!(
                        "template {} is referenced by a completed export and cannot change; publish a new version",
                        template.version_key()
                    ),
                    code: ErrorCode::StoImmutable,
                });
            }
        }
        self.write_json(&self.template_path(&template.id, template.version), template)
            .await
    }

    async fn load_template(&self, id: &str, version: Option<u32>) -> LecternResult<Template> {
        check_template_id(id)?;
        let version = match version {
            Some(v) => v,
            None => self
                .template_versions(id)
                .await?
                .last()
                .copied()
                .ok_or_else(|| LecternError::not_found("Template", id))?,
        };
        let key = format!("{}@{}", id, version);
        self.read_json(&self.template_path(id, version), "Template", &key)
            .await
    }

    async fn lock_template(&self, id: &str, version: u32) -> LecternResult<()> {
        check_template_id(id)?;
        if tokio::fs::metadata(self.template_path(id, version)).await.is_err() {
            return Err(LecternError::not_found("Template", format!("{}@{}", id, version)));
        }
        write_atomic(&self.lock_path(id, version), Vec::new()).await
    }

    async fn is_template_locked(&self, id: &str, version: u32) -> LecternResult<bool> {
        check_template_id(id)?;
        Ok(tokio::fs::try_exists(self.lock_path(id, version)).await?)
    }

    async fn find_export(&self, content_hash: &str, format: ExportFormat) -> LecternResult<Option<PathBuf>> {
        let path = self.export_path(content_hash, format);
        Ok(tokio::fs::try_exists(&path).await?.then_some(path))
    }

    async fn put_export(
        &self,
        content_hash: &str,
        format: ExportFormat,
        bytes: &[u8],
    ) -> LecternResult<PathBuf> {
        let path = self.export_path(content_hash, format);
        write_atomic(&path, bytes.to_vec()).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArtifactMetadata, ArtifactSection, ContentBlock, ContentType};
    use chrono::Utc;

    fn artifact() -> ContentArtifact {
        ContentArtifact {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            content_type: ContentType::StudyGuide,
            title: "Cells".into(),
            sections: vec![ArtifactSection {
                source_index: 0,
                title: "Unit 1".into(),
                blocks: vec![ContentBlock::paragraph("body")],
            }],
            metadata: ArtifactMetadata::default(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_artifact_roundtrip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();
        let a = artifact();
        store.save_artifact(&a).await.unwrap();
        assert_eq!(store.load_artifact(a.id).await.unwrap(), a);
        assert_eq!(store.list_artifacts().await.unwrap(), vec![a.id]);

        let err = store.load_artifact(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::StoNotFound);
    }

    #[tokio::test]
    async fn test_locked_template_rejects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();
        let t = Template::new("handout", "Handout", "{{body}}");
        store.save_template(&t).await.unwrap();
        store.lock_template("handout", 1).await.unwrap();

        // Same content is accepted.
        store.save_template(&t).await.unwrap();

        let changed = t.clone().with_slot("paragraph", "{{text}}\\par\n");
        let err = store.save_template(&changed).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::StoImmutable);

        // A new version is fine and becomes the latest.
        store.save_template(&changed.with_version(2)).await.unwrap();
        assert_eq!(store.load_template("handout", None).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_template_id_must_be_path_safe() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();
        let t = Template::new("../evil", "Evil", "{{body}}");
        assert!(store.save_template(&t).await.is_err());
    }

    #[tokio::test]
    async fn test_export_cache_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();
        assert!(store.find_export("abc", ExportFormat::Html).await.unwrap().is_none());
        let path = store.put_export("abc", ExportFormat::Html, b"<p>x</p>").await.unwrap();
        assert_eq!(store.find_export("abc", ExportFormat::Html).await.unwrap(), Some(path.clone()));
        assert_eq!(std::fs::read(path).unwrap(), b"<p>x</p>");
        // No stray temp files left next to the output.
        let entries = std::fs::read_dir(dir.path().join("exports")).unwrap().count();
        assert_eq!(entries, 1);
    }
}

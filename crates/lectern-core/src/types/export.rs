//! Export job types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

/// Output file format.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Docx,
    Pptx,
    Html,
    Latex,
}

impl ExportFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Pptx => "pptx",
            Self::Html => "html",
            Self::Latex => "tex",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            Self::Pptx => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            Self::Html => "text/html",
            Self::Latex => "application/x-latex",
        }
    }

    /// Whether producing this format needs the external compiler.
    pub fn needs_compiler(&self) -> bool {
        !matches!(self, Self::Latex)
    }
}

/// Page layout and content options applied when rendering a skeleton.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Paper size such as `a4`, `A4` or `letterpaper`.
    pub paper_size: String,
    /// Base font size such as `11pt`.
    pub font_size: String,
    /// Uniform page margin such as `2.5cm`. `None` keeps the class default.
    pub margins: Option<String>,
    pub page_numbers: bool,
    pub table_of_contents: bool,
    /// Print the creation date and artifact metadata under the title.
    pub include_metadata: bool,
    /// Embed local images; otherwise images render as their alt text.
    pub include_images: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            paper_size: "a4paper".to_string(),
            font_size: "12pt".to_string(),
            margins: None,
            page_numbers: true,
            table_of_contents: false,
            include_metadata: true,
            include_images: true,
        }
    }
}

impl ExportSettings {
    /// Builder: toggle the table of contents.
    pub fn with_table_of_contents(mut self, enabled: bool) -> Self {
        self.table_of_contents = enabled;
        self
    }

    /// Paper size as a LaTeX class option: `A4` becomes `a4paper`.
    pub fn paper_option(&self) -> String {
        let paper = self.paper_size.trim().to_ascii_lowercase();
        if paper.ends_with("paper") {
            paper
        } else {
            format!("{}paper", paper)
        }
    }
}

/// Request to render one artifact with one template into several formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportJob {
    pub id: Uuid,
    pub artifact_id: Uuid,
    pub template_id: String,
    pub template_version: u32,
    pub formats: Vec<ExportFormat>,
    /// Overrides the template's default settings when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<ExportSettings>,
    pub created_at: DateTime<Utc>,
}

impl ExportJob {
    pub fn new(
        artifact_id: Uuid,
        template_id: impl Into<String>,
        template_version: u32,
        formats: Vec<ExportFormat>,
    ) -> Self {
        let mut unique = formats;
        unique.sort();
        unique.dedup();
        Self {
            id: Uuid::new_v4(),
            artifact_id,
            template_id: template_id.into(),
            template_version,
            formats: unique,
            settings: None,
            created_at: Utc::now(),
        }
    }

    /// Builder: per-job settings override.
    pub fn with_settings(mut self, settings: Option<ExportSettings>) -> Self {
        self.settings = settings;
        self
    }
}

/// Outcome for one format in a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FormatStatus {
    Completed {
        path: PathBuf,
        content_hash: String,
        size_bytes: u64,
        /// Served from the store without running the compiler.
        cached: bool,
    },
    Failed {
        code: String,
        message: String,
    },
}

impl FormatStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Completed { cached: true, .. })
    }
}

/// Per-format result map for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReport {
    pub job: ExportJob,
    pub statuses: BTreeMap<ExportFormat, FormatStatus>,
}

impl ExportReport {
    /// True when every requested format completed.
    pub fn all_completed(&self) -> bool {
        self.statuses.values().all(FormatStatus::is_completed)
    }

    /// True when at least one format completed.
    pub fn any_completed(&self) -> bool {
        self.statuses.values().any(FormatStatus::is_completed)
    }

    pub fn status(&self, format: ExportFormat) -> Option<&FormatStatus> {
        self.statuses.get(&format)
    }
}

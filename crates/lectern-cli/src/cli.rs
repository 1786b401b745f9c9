//! Command definitions and the async entrypoint shared by `main` and tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use lectern_core::enrichment::WebEnricher;
use lectern_core::types::{EnrichmentScope, GenerationConfig};
use lectern_core::{
    ArtifactStore, ContentArtifact, ContentType, ExportFormat, ExportSettings, FailoverChain, FsStore, GenerationMode,
    GenerationRequest, GenerationSettings, LecternConfig, Orchestrator, ProviderSelection, RateLimitRegistry,
    SectionTarget, SyllabusDocument,
};
use lectern_export::{builtin, CommandCompiler, ExportEngine};
use lectern_extractors::SyllabusExtractor;
use lectern_llm::build_registry;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Turn syllabi into generated courseware and export it.
#[derive(Debug, Parser)]
#[command(name = "lectern", version, about = "Syllabus-to-courseware generation and export")]
pub struct Cli {
    /// Config file (.toml, .json or .yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Store directory, overriding the configured one
    #[arg(long, global = true)]
    pub storage: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Extract a syllabus document and store it
    Extract {
        file: PathBuf,
        /// Declared MIME type; inferred from the extension when absent
        #[arg(long)]
        mime: Option<String>,
    },
    /// Generate an artifact for a stored syllabus
    Generate {
        #[arg(long)]
        document: Uuid,
        #[command(flatten)]
        generation: GenerationArgs,
    },
    /// Export a stored artifact
    Export {
        #[arg(long)]
        artifact: Uuid,
        #[command(flatten)]
        export: ExportArgs,
    },
    /// Merge stored artifacts into one export
    Combine {
        #[arg(long, required = true, value_delimiter = ',')]
        artifacts: Vec<Uuid>,
        #[arg(long)]
        title: String,
        #[command(flatten)]
        export: ExportArgs,
    },
    /// Extract, generate and export in one pass
    Run {
        file: PathBuf,
        #[arg(long)]
        mime: Option<String>,
        #[command(flatten)]
        generation: GenerationArgs,
        #[command(flatten)]
        export: ExportArgs,
    },
    /// List configured providers
    Providers {
        /// Check each provider's health endpoint
        #[arg(long)]
        check: bool,
    },
    /// List built-in templates
    Templates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Strict,
    BestEffort,
}

impl From<ModeArg> for GenerationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Strict => GenerationMode::Strict,
            ModeArg::BestEffort => GenerationMode::BestEffort,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct GenerationArgs {
    /// class_session, study_guide, presentation, worksheet or assessment
    #[arg(long = "type", default_value = "study_guide")]
    pub content_type: ContentType,
    /// Primary provider id; defaults to the configured one
    #[arg(long)]
    pub provider: Option<String>,
    #[arg(long)]
    pub model: Option<String>,
    /// Ordered fallback providers
    #[arg(long = "fallback", value_delimiter = ',')]
    pub fallbacks: Option<Vec<String>>,
    /// Generate for one section index only
    #[arg(long)]
    pub section: Option<usize>,
    #[arg(long)]
    pub language: Option<String>,
    #[arg(long)]
    pub tone: Option<String>,
    /// Relative length, 1 to 20
    #[arg(long)]
    pub length: Option<u8>,
    #[arg(long)]
    pub level: Option<String>,
    #[arg(long)]
    pub instructions: Option<String>,
    /// Look up every topic on the web before generating
    #[arg(long)]
    pub enrich: bool,
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,
}

impl GenerationArgs {
    /// Build a request against `document_id`.
    pub fn request(&self, document_id: Uuid, config: &LecternConfig) -> GenerationRequest {
        let primary = self
            .provider
            .clone()
            .unwrap_or_else(|| config.default_provider.clone());
        let mut selection = ProviderSelection::new(primary);
        if let Some(model) = &self.model {
            selection = selection.with_model(model.clone());
        }
        if let Some(fallbacks) = &self.fallbacks {
            selection = selection.with_fallbacks(fallbacks.clone());
        }

        let mut content = GenerationConfig::default();
        if let Some(language) = &self.language {
            content.language = language.clone();
        }
        if let Some(tone) = &self.tone {
            content.tone = tone.clone();
        }
        if let Some(length) = self.length {
            content.content_length = length;
        }
        if let Some(level) = &self.level {
            content.educational_level = level.clone();
        }
        content.additional_instructions = self.instructions.clone();

        let mut request = GenerationRequest::new(document_id, self.content_type, selection).with_config(content);
        if let Some(index) = self.section {
            request = request.with_target(SectionTarget::Index(index));
        }
        if self.enrich {
            request = request.with_enrichment(EnrichmentScope::AllTopics);
        }
        if let Some(mode) = self.mode {
            request = request.with_mode(mode.into());
        }
        request
    }
}

#[derive(Debug, Clone, Args)]
pub struct ExportArgs {
    /// Template id, stored or built-in
    #[arg(long, default_value = builtin::ARTICLE_ID)]
    pub template: String,
    #[arg(long = "template-version")]
    pub template_version: Option<u32>,
    /// Target formats: pdf, docx, pptx, html, latex
    #[arg(long = "format", value_delimiter = ',', default_value = "pdf")]
    pub formats: Vec<ExportFormat>,
    /// Copy finished files into this directory
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Paper size, e.g. a4 or letter
    #[arg(long)]
    pub paper: Option<String>,
    /// Base font size, e.g. 11pt
    #[arg(long = "font-size")]
    pub font_size: Option<String>,
    /// Page margins, e.g. 2cm
    #[arg(long)]
    pub margins: Option<String>,
    /// Table of contents; `--toc false` turns it off for combined exports
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub toc: Option<bool>,
    #[arg(long = "no-page-numbers")]
    pub no_page_numbers: bool,
    #[arg(long = "no-metadata")]
    pub no_metadata: bool,
    #[arg(long = "no-images")]
    pub no_images: bool,
}

impl ExportArgs {
    /// Settings override built on `defaults`, or `None` when no setting flag was given.
    pub fn settings(&self, defaults: &ExportSettings) -> Option<ExportSettings> {
        let touched = self.paper.is_some()
            || self.font_size.is_some()
            || self.margins.is_some()
            || self.toc.is_some()
            || self.no_page_numbers
            || self.no_metadata
            || self.no_images;
        if !touched {
            return None;
        }
        let mut settings = defaults.clone();
        if let Some(paper) = &self.paper {
            settings.paper_size = paper.clone();
        }
        if let Some(font_size) = &self.font_size {
            settings.font_size = font_size.clone();
        }
        if let Some(margins) = &self.margins {
            settings.margins = Some(margins.clone());
        }
        if let Some(toc) = self.toc {
            settings.table_of_contents = toc;
        }
        settings.page_numbers &= !self.no_page_numbers;
        settings.include_metadata &= !self.no_metadata;
        settings.include_images &= !self.no_images;
        Some(settings)
    }
}

/// MIME type for a syllabus file, from its extension.
pub fn mime_for_path(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => Ok("application/pdf"),
        "docx" => Ok(DOCX_MIME),
        "txt" | "text" => Ok("text/plain"),
        "md" | "markdown" => Ok("text/markdown"),
        _ => Err(anyhow!(
            "cannot infer the MIME type of {}; pass --mime",
            path.display()
        )),
    }
}

/// File config (when given) overlaid with `LECTERN_*` and provider key variables.
pub fn load_config(path: Option<&Path>) -> Result<LecternConfig> {
    let mut config = match path {
        Some(path) => LecternConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => LecternConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

fn orchestrator(config: &LecternConfig) -> Result<Orchestrator> {
    let limits = RateLimitRegistry::new();
    let registry = build_registry(config, &limits)?;
    let chain = FailoverChain::new(Arc::new(registry), config.retry_policy())
        .with_call_timeout(config.request_timeout());
    let mut orchestrator = Orchestrator::new(chain, GenerationSettings::from(config));
    if config.enrichment.enabled {
        orchestrator = orchestrator.with_enricher(Arc::new(WebEnricher::new(&config.enrichment)?));
    }
    Ok(orchestrator)
}

fn export_engine(config: &LecternConfig, store: Arc<FsStore>, out: Option<PathBuf>) -> ExportEngine {
    let compiler = Arc::new(CommandCompiler::from_config(&config.export));
    let engine = ExportEngine::new(store, compiler);
    match out.or_else(|| config.export.output_dir.clone()) {
        Some(dir) => engine.with_output_dir(dir),
        None => engine,
    }
}

fn document_summary(document: &SyllabusDocument) -> Value {
    json!({
        "document_id": document.id,
        "format": document.format,
        "degraded": document.degraded,
        "metadata": document.metadata,
        "sections": document.sections.iter().map(|s| json!({
            "index": s.index,
            "title": s.title,
            "topics": s.topics,
            "estimated_minutes": s.estimated_minutes,
        })).collect::<Vec<_>>(),
    })
}

async fn extract(store: &FsStore, file: &Path, mime: Option<&str>) -> Result<SyllabusDocument> {
    let mime = match mime {
        Some(mime) => mime,
        None => mime_for_path(file)?,
    };
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let document = SyllabusExtractor::with_defaults().extract(&bytes, mime).await?;
    store.save_document(&document).await?;
    Ok(document)
}

async fn generate(
    config: &LecternConfig,
    store: &FsStore,
    document: &SyllabusDocument,
    args: &GenerationArgs,
    cancel: &CancellationToken,
) -> Result<(ContentArtifact, Value)> {
    let request = args.request(document.id, config);
    let outcome = orchestrator(config)?.generate(document, &request, cancel).await?;
    store.save_artifact(&outcome.artifact).await?;
    let stats = &outcome.stats;
    let summary = json!({
        "artifact_id": outcome.artifact.id,
        "title": outcome.artifact.title,
        "sections": outcome.artifact.sections.len(),
        "chunks_total": stats.chunks_total,
        "chunks_failed": stats.chunks_failed,
        "provider_calls": stats.provider_calls,
        "total_tokens": stats.total_tokens,
        "elapsed_ms": stats.elapsed.as_millis() as u64,
    });
    Ok((outcome.artifact, summary))
}

async fn open_store(config: &LecternConfig) -> Result<Arc<FsStore>> {
    let store = FsStore::open(&config.storage_dir).await?;
    tracing::debug!(storage = %config.storage_dir.display(), "Using store");
    Ok(Arc::new(store))
}

/// Execute one command and return its JSON output.
pub async fn run(cli: Cli, cancel: &CancellationToken) -> Result<Value> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(storage) = cli.storage {
        config.storage_dir = storage;
    }

    match cli.command {
        Commands::Templates => {
            let templates: Vec<Value> = builtin::builtin_templates()
                .iter()
                .map(|t| json!({ "id": t.id, "name": t.name, "version": t.version, "tags": t.tags }))
                .collect();
            Ok(json!({ "templates": templates }))
        }
        Commands::Providers { check } => {
            let providers: Vec<Value> = config
                .providers
                .iter()
                .map(|(id, p)| json!({ "id": id, "kind": p.kind.to_string(), "model": p.model }))
                .collect();
            let mut output = json!({ "default": config.default_provider, "providers": providers });
            if check {
                let registry = build_registry(&config, &RateLimitRegistry::new())?;
                output["health"] = serde_json::to_value(registry.health().await)?;
            }
            Ok(output)
        }
        Commands::Extract { file, mime } => {
            let store = open_store(&config).await?;
            let document = extract(&store, &file, mime.as_deref()).await?;
            Ok(document_summary(&document))
        }
        Commands::Generate { document, generation } => {
            let store = open_store(&config).await?;
            let document = store.load_document(document).await?;
            let (_, summary) = generate(&config, &store, &document, &generation, cancel).await?;
            Ok(summary)
        }
        Commands::Export { artifact, export } => {
            let store = open_store(&config).await?;
            let artifact = store.load_artifact(artifact).await?;
            let engine = export_engine(&config, store, export.out.clone());
            let template = engine.template(&export.template, export.template_version).await?;
            let settings = export.settings(&template.default_settings);
            let report = engine
                .export_with_settings(&artifact, &template, &export.formats, settings, cancel)
                .await?;
            Ok(serde_json::to_value(report)?)
        }
        Commands::Combine {
            artifacts,
            title,
            export,
        } => {
            let store = open_store(&config).await?;
            let mut parts = Vec::with_capacity(artifacts.len());
            for id in artifacts {
                parts.push(store.load_artifact(id).await?);
            }
            let engine = export_engine(&config, store, export.out.clone());
            let template = engine.template(&export.template, export.template_version).await?;
            // Combined exports default to a table of contents.
            let defaults = template.default_settings.clone().with_table_of_contents(true);
            let settings = export.settings(&defaults);
            let report = engine
                .export_combined(&parts, &title, &template, &export.formats, settings, cancel)
                .await?;
            Ok(serde_json::to_value(report)?)
        }
        Commands::Run {
            file,
            mime,
            generation,
            export,
        } => {
            let store = open_store(&config).await?;
            let document = extract(&store, &file, mime.as_deref()).await?;
            let extracted = document_summary(&document);
            let (artifact, generated) = generate(&config, &store, &document, &generation, cancel).await?;
            let engine = export_engine(&config, store, export.out.clone());
            let template = engine.template(&export.template, export.template_version).await?;
            let settings = export.settings(&template.default_settings);
            let report = engine
                .export_with_settings(&artifact, &template, &export.formats, settings, cancel)
                .await?;
            Ok(json!({
                "extracted": extracted,
                "generated": generated,
                "exported": report,
            }))
        }
    }
}

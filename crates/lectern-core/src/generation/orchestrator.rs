//! Generation orchestrator: syllabus sections to a content artifact.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{EnrichmentConfig, LecternConfig};
use crate::enrichment::{enrich_topics, EnrichmentResult};
use crate::error::{LecternError, LecternResult, ProviderFailure};
use crate::generation::chunker::{Chunk, Chunker};
use crate::generation::failover::{ChainOutcome, ChainStep, FailoverChain};
use crate::generation::parser::{first_title, parse_markdown};
use crate::generation::prompts::{build_prompt, prompt_overhead_tokens, PromptContext, GENERATION_TEMPERATURE};
use crate::generation::stitcher::stitch;
use crate::traits::{Enricher, GenerationOptions, ProviderCapabilities};
use crate::types::{
    ArtifactMetadata, ArtifactSection, ContentArtifact, ContentBlock, EnrichmentScope, GenerationMode,
    GenerationRequest, Prompt, ProviderRecord, SectionTarget, SyllabusDocument, SyllabusSection,
};

/// Orchestrator settings, usually taken from [`LecternConfig`].
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub default_fallbacks: Vec<String>,
    pub chunk_overlap_ratio: f32,
    pub strict: bool,
    pub max_parallel_chunks: usize,
    pub enrichment: EnrichmentConfig,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from(&LecternConfig::default())
    }
}

impl From<&LecternConfig> for GenerationSettings {
    fn from(config: &LecternConfig) -> Self {
        Self {
            default_fallbacks: config.fallback_providers.clone(),
            chunk_overlap_ratio: config.chunk_overlap_ratio,
            strict: config.strict_generation_mode,
            max_parallel_chunks: config.max_parallel_chunks.max(1),
            enrichment: config.enrichment.clone(),
        }
    }
}

/// Counters for one generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationStats {
    pub chunks_total: usize,
    pub chunks_failed: usize,
    /// Attempts made per provider id, successful or not.
    pub provider_calls: BTreeMap<String, u32>,
    pub total_tokens: u64,
    pub elapsed: Duration,
}

/// A generated artifact plus run statistics.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub artifact: ContentArtifact,
    pub stats: GenerationStats,
}

struct ChunkJob {
    /// Position of the section in the selected list.
    slot: usize,
    chunk: Chunk,
    prompt: Prompt,
}

/// Drives chunked, failover-backed generation for one request at a time.
pub struct Orchestrator {
    chain: FailoverChain,
    enricher: Option<Arc<dyn Enricher>>,
    settings: GenerationSettings,
}

impl Orchestrator {
    pub fn new(chain: FailoverChain, settings: GenerationSettings) -> Self {
        Self {
            chain,
            enricher: None,
            settings,
        }
    }

    /// Builder: attach a topic enricher.
    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn chain(&self) -> &FailoverChain {
        &self.chain
    }

    /// Generate an artifact for `request` over `document`.
    ///
    /// Nothing is persisted. On cancellation in-flight provider calls are
    /// dropped and `LecternError::Cancelled` is returned.
    pub async fn generate(
        &self,
        document: &SyllabusDocument,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> LecternResult<GenerationOutcome> {
        let started = Instant::now();
        request.validate()?;
        if request.document_id != document.id {
            return Err(LecternError::validation(format!(
                "request references document {}, got {}",
                request.document_id, document.id
            )));
        }

        let sections = select_sections(document, request.target)?;
        let strict = match request.mode {
            Some(mode) => mode == GenerationMode::Strict,
            None => self.settings.strict,
        };
        let steps = self.chain_steps(request);
        let capabilities = self
            .chain
            .registry()
            .get(&request.providers.primary)
            .map(|p| p.capabilities())
            .unwrap_or_default();

        tracing::info!(
            request_id = %request.id,
            document_id = %document.id,
            content_type = %request.content_type,
            sections = sections.len(),
            primary = %request.providers.primary,
            strict,
            "Starting generation"
        );

        let enrichment = self.enrich(&sections, &request.enrichment, cancel).await?;
        let jobs = self.plan(document, request, &sections, &enrichment, &capabilities);
        let chunk_counts: Vec<usize> = sections
            .iter()
            .enumerate()
            .map(|(slot, _)| jobs.iter().filter(|j| j.slot == slot).count())
            .collect();

        let options = GenerationOptions::default()
            .with_max_tokens(request.config.max_tokens())
            .with_temperature(GENERATION_TEMPERATURE);

        let mut stats = GenerationStats {
            chunks_total: jobs.len(),
            ..GenerationStats::default()
        };
        let mut metadata = ArtifactMetadata {
            enriched: enrichment.flags.clone(),
            extra: template_meta(document, request),
            ..ArtifactMetadata::default()
        };
        let mut per_section: Vec<Vec<Vec<ContentBlock>>> = chunk_counts.iter().map(|n| Vec::with_capacity(*n)).collect();
        let mut title_from_output: Option<String> = None;

        let chain = &self.chain;
        let steps = &steps;
        let options = &options;
        let mut results = stream::iter(jobs)
            .map(|job| async move {
                let result = chain.generate(steps, &job.prompt, options, cancel).await;
                (job.slot, job.chunk, result)
            })
            .buffered(self.settings.max_parallel_chunks.max(1));

        while let Some((slot, chunk, result)) = results.next().await {
            let section_index = sections[slot].index;
            match result {
                Ok(ChainOutcome { response, failures }) => {
                    record_failures(&mut stats, &failures);
                    *stats.provider_calls.entry(response.provider.clone()).or_default() += response.attempts;
                    if let Some(usage) = response.usage {
                        stats.total_tokens += u64::from(usage.total_tokens);
                    }
                    metadata.provider_failures.extend(failures);
                    metadata.providers.push(ProviderRecord {
                        section: section_index,
                        chunk: chunk.index,
                        provider: response.provider.clone(),
                        model: response.model.clone(),
                        latency_ms: response.latency.as_millis() as u64,
                        attempts: response.attempts,
                        total_tokens: response.usage.map(|u| u.total_tokens),
                    });

                    let blocks = parse_markdown(&response.content);
                    if title_from_output.is_none() {
                        title_from_output = first_title(&blocks).map(str::to_string);
                    }
                    per_section[slot].push(blocks);
                }
                Err(LecternError::Cancelled) => {
                    tracing::info!(request_id = %request.id, "Generation cancelled");
                    return Err(LecternError::Cancelled);
                }
                Err(err) => {
                    let failures = match &err {
                        LecternError::AllProvidersExhausted { failures } => failures.clone(),
                        _ => Vec::new(),
                    };
                    record_failures(&mut stats, &failures);
                    stats.chunks_failed += 1;

                    if strict {
                        tracing::warn!(section = section_index, chunk = chunk.index, error = %err, "Chunk failed in strict mode");
                        return Err(LecternError::ChunkFailed {
                            section: section_index,
                            chunk: chunk.index,
                            source: Box::new(err),
                        });
                    }
                    tracing::warn!(
                        section = section_index,
                        chunk = chunk.index,
                        error = %err,
                        "Chunk failed, inserting placeholder"
                    );
                    metadata.provider_failures.extend(failures);
                    per_section[slot].push(vec![ContentBlock::generation_failed(
                        section_index,
                        chunk.index,
                        err.to_string(),
                    )]);
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(LecternError::Cancelled);
        }

        let artifact_sections: Vec<ArtifactSection> = sections
            .iter()
            .zip(per_section)
            .map(|(section, chunks)| ArtifactSection {
                source_index: section.index,
                title: section.title.clone(),
                blocks: stitch(chunks),
            })
            .collect();

        let title = title_from_output.unwrap_or_else(|| {
            let subject = match (request.target, sections.first()) {
                (SectionTarget::Index(_), Some(section)) => section.title.as_str(),
                _ => document.display_title(),
            };
            format!("{}: {}", request.content_type.label(), subject)
        });

        stats.elapsed = started.elapsed();
        let artifact = ContentArtifact {
            id: Uuid::new_v4(),
            document_id: document.id,
            request_id: request.id,
            content_type: request.content_type,
            title,
            sections: artifact_sections,
            metadata,
            created_at: Utc::now(),
        };

        tracing::info!(
            request_id = %request.id,
            artifact_id = %artifact.id,
            chunks = stats.chunks_total,
            failed = stats.chunks_failed,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Generation finished"
        );
        Ok(GenerationOutcome { artifact, stats })
    }

    fn chain_steps(&self, request: &GenerationRequest) -> Vec<ChainStep> {
        request
            .providers
            .chain(&self.settings.default_fallbacks)
            .into_iter()
            .map(|id| {
                let model = (id == request.providers.primary)
                    .then(|| request.providers.model.clone())
                    .flatten();
                ChainStep::new(id).with_model(model)
            })
            .collect()
    }

    async fn enrich(
        &self,
        sections: &[&SyllabusSection],
        scope: &EnrichmentScope,
        cancel: &CancellationToken,
    ) -> LecternResult<EnrichmentResult> {
        let mut topics: Vec<String> = Vec::new();
        for topic in sections.iter().flat_map(|s| s.topics.iter()) {
            if scope.includes(topic) && !topics.contains(topic) {
                topics.push(topic.clone());
            }
        }
        if topics.is_empty() {
            return Ok(EnrichmentResult::default());
        }

        match (&self.enricher, self.settings.enrichment.enabled) {
            (Some(enricher), true) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(LecternError::Cancelled),
                    result = enrich_topics(enricher.as_ref(), &topics, &self.settings.enrichment) => Ok(result),
                }
            }
            _ => {
                tracing::warn!(topics = topics.len(), "Enrichment requested but no enricher is enabled");
                Ok(EnrichmentResult {
                    flags: topics.into_iter().map(|t| (t, false)).collect(),
                    ..EnrichmentResult::default()
                })
            }
        }
    }

    fn plan(
        &self,
        document: &SyllabusDocument,
        request: &GenerationRequest,
        sections: &[&SyllabusSection],
        enrichment: &EnrichmentResult,
        capabilities: &ProviderCapabilities,
    ) -> Vec<ChunkJob> {
        let mut jobs = Vec::new();
        for (slot, section) in sections.iter().enumerate() {
            let snippets = enrichment.snippets_for(&section.topics);
            let text = section_source_text(section);

            let mut ctx = PromptContext {
                content_type: request.content_type,
                config: &request.config,
                document,
                section,
                chunk_index: 0,
                chunk_total: 1,
                snippets: &snippets,
            };
            let window = Chunker::window_for(
                capabilities.max_context_tokens,
                request.config.max_tokens(),
                prompt_overhead_tokens(&ctx),
            );
            let chunks = Chunker::new(window, self.settings.chunk_overlap_ratio).split(section.index, &text);

            for chunk in chunks {
                ctx.chunk_index = chunk.index;
                ctx.chunk_total = chunk.total;
                let prompt = build_prompt(&ctx, &chunk.text);
                jobs.push(ChunkJob { slot, chunk, prompt });
            }
        }
        jobs
    }
}

fn select_sections(document: &SyllabusDocument, target: SectionTarget) -> LecternResult<Vec<&SyllabusSection>> {
    match target {
        SectionTarget::All => Ok(document.sections.iter().collect()),
        SectionTarget::Index(n) => document.section(n).map(|s| vec![s]).ok_or_else(|| LecternError::Validation {
            message: format!(
                "section index {} out of range (document has {} sections)",
                n,
                document.sections.len()
            ),
            code: crate::error::ErrorCode::ValOutOfRange,
            details: Default::default(),
        }),
    }
}

fn section_source_text(section: &SyllabusSection) -> String {
    if section.body.trim().is_empty() {
        if section.topics.is_empty() {
            section.title.clone()
        } else {
            format!("{}\n{}", section.title, section.topics.join("\n"))
        }
    } else {
        section.body.clone()
    }
}

fn record_failures(stats: &mut GenerationStats, failures: &[ProviderFailure]) {
    for failure in failures {
        *stats.provider_calls.entry(failure.provider.clone()).or_default() += failure.attempts;
    }
}

fn template_meta(document: &SyllabusDocument, request: &GenerationRequest) -> BTreeMap<String, String> {
    let mut meta = BTreeMap::new();
    meta.insert("document_title".to_string(), document.display_title().to_string());
    meta.insert("content_type".to_string(), request.content_type.label().to_string());
    meta.insert("language".to_string(), request.config.language.clone());
    meta.insert("educational_level".to_string(), request.config.educational_level.clone());
    if let Some(code) = &document.metadata.course_code {
        meta.insert("course_code".to_string(), code.clone());
    }
    if let Some(subject) = &document.metadata.subject {
        meta.insert("subject".to_string(), subject.clone());
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocumentFormat, SyllabusMetadata};

    fn doc() -> SyllabusDocument {
        SyllabusDocument {
            id: Uuid::new_v4(),
            format: DocumentFormat::Text,
            raw: Vec::new(),
            text: String::new(),
            sections: vec![SyllabusSection::new(0, "Unit 1", "")],
            metadata: SyllabusMetadata::default(),
            degraded: false,
        }
    }

    #[test]
    fn test_select_out_of_range() {
        let d = doc();
        let err = select_sections(&d, SectionTarget::Index(3)).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ValOutOfRange);
        assert_eq!(select_sections(&d, SectionTarget::All).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_body_uses_title_and_topics() {
        let s = SyllabusSection::new(0, "Unit 1", " ").with_topics(vec!["Cells".into()]);
        assert_eq!(section_source_text(&s), "Unit 1\nCells");
    }
}

//! lectern-core - Core library for lectern.
//!
//! This crate provides the types, traits, error taxonomy and generation
//! orchestrator for the lectern syllabus-to-courseware pipeline.
//!
//! # Example
//!
//! ```ignore
//! use lectern_core::{FailoverChain, LecternConfig, Orchestrator, ProviderRegistry};
//!
//! let config = LecternConfig::from_env()?;
//! let chain = FailoverChain::new(Arc::new(registry), config.retry_policy());
//! let orchestrator = Orchestrator::new(chain, (&config).into());
//!
//! let outcome = orchestrator.generate(&document, &request, &cancel).await?;
//! println!("{}", outcome.artifact.title);
//! ```

pub mod config;
pub mod enrichment;
pub mod error;
pub mod generation;
pub mod ratelimit;
pub mod registry;
pub mod retry;
pub mod store;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{EnrichmentConfig, ExportConfig, LecternConfig, ProviderConfig, ProviderKind};
pub use error::{ErrorCode, FailureKind, LecternError, LecternResult, ProviderFailure};
pub use generation::{FailoverChain, GenerationOutcome, GenerationSettings, GenerationStats, Orchestrator};
pub use ratelimit::{RateLimitRegistry, RateLimiter};
pub use registry::ProviderRegistry;
pub use retry::RetryPolicy;
pub use store::FsStore;
pub use traits::{
    ArtifactStore, DocumentCompiler, Enricher, EnrichmentSnippet, GenerationOptions, Provider,
    ProviderCapabilities, ProviderHealth, ProviderResponse, RateLimitPolicy, TokenUsage,
};
pub use types::{
    ContentArtifact, ContentBlock, ContentType, DocumentFormat, ExportFormat, ExportJob, ExportReport, ExportSettings,
    FormatStatus, GenerationConfig, GenerationMode, GenerationRequest, Prompt, ProviderSelection,
    SectionTarget, SyllabusDocument, SyllabusSection, Template,
};

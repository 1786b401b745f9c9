//! Web enrichment trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LecternResult;

/// A short piece of external context for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentSnippet {
    pub topic: String,
    /// Where the text came from (URL or source name).
    pub source: String,
    pub text: String,
}

/// Looks up supplementary context for syllabus topics.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Source name used in logs.
    fn name(&self) -> &str;

    /// Fetch snippets for one topic. An empty list is a successful lookup with no results.
    async fn lookup(&self, topic: &str) -> LecternResult<Vec<EnrichmentSnippet>>;
}

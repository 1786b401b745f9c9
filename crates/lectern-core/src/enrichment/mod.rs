//! Bounded-latency topic enrichment.

mod web;

pub use web::WebEnricher;

use std::collections::BTreeMap;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::config::EnrichmentConfig;
use crate::traits::{EnrichmentSnippet, Enricher};

/// Per-topic lookup results.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentResult {
    /// `true` when the lookup succeeded, `false` on failure or timeout.
    pub flags: BTreeMap<String, bool>,
    pub snippets: BTreeMap<String, Vec<EnrichmentSnippet>>,
}

impl EnrichmentResult {
    /// Snippets for the given topics, in topic order.
    pub fn snippets_for(&self, topics: &[String]) -> Vec<EnrichmentSnippet> {
        topics
            .iter()
            .filter_map(|t| self.snippets.get(t))
            .flatten()
            .cloned()
            .collect()
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", text[..idx].trim_end()),
        None => text.to_string(),
    }
}

/// Look up every topic with a per-lookup timeout.
///
/// Failures never propagate: they are logged and the topic is flagged `false`.
/// Snippets are capped at `max_snippets` per topic and `max_snippet_chars` each.
pub async fn enrich_topics(
    enricher: &dyn Enricher,
    topics: &[String],
    config: &EnrichmentConfig,
) -> EnrichmentResult {
    let timeout = Duration::from_millis(config.timeout_ms);
    let lookups = stream::iter(topics.iter().cloned())
        .map(|topic| async move {
            let outcome = tokio::time::timeout(timeout, enricher.lookup(&topic)).await;
            (topic, outcome)
        })
        .buffered(config.max_concurrent_lookups.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut result = EnrichmentResult::default();
    for (topic, outcome) in lookups {
        match outcome {
            Ok(Ok(snippets)) => {
                let bounded: Vec<EnrichmentSnippet> = snippets
                    .into_iter()
                    .take(config.max_snippets)
                    .map(|mut s| {
                        s.text = truncate_chars(&s.text, config.max_snippet_chars);
                        s
                    })
                    .collect();
                tracing::debug!(topic = %topic, snippets = bounded.len(), source = enricher.name(), "Enriched topic");
                result.flags.insert(topic.clone(), true);
                result.snippets.insert(topic, bounded);
            }
            Ok(Err(err)) => {
                tracing::warn!(topic = %topic, error = %err, "Enrichment lookup failed");
                result.flags.insert(topic, false);
            }
            Err(_) => {
                tracing::warn!(topic = %topic, timeout_ms = config.timeout_ms, "Enrichment lookup timed out");
                result.flags.insert(topic, false);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LecternError, LecternResult};
    use async_trait::async_trait;

    struct Scripted;

    #[async_trait]
    impl Enricher for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn lookup(&self, topic: &str) -> LecternResult<Vec<EnrichmentSnippet>> {
            match topic {
                "fail" => Err(LecternError::Internal("down".into())),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Vec::new())
                }
                _ => Ok((0..5)
                    .map(|i| EnrichmentSnippet {
                        topic: topic.to_string(),
                        source: "test".into(),
                        text: format!("{} snippet {} with a fairly long body of text", topic, i),
                    })
                    .collect()),
            }
        }
    }

    #[tokio::test]
    async fn test_failures_are_flagged_not_raised() {
        let config = EnrichmentConfig {
            timeout_ms: 50,
            max_snippets: 2,
            max_snippet_chars: 10,
            ..EnrichmentConfig::default()
        };
        let topics = vec!["ok".to_string(), "fail".to_string(), "slow".to_string()];
        let result = enrich_topics(&Scripted, &topics, &config).await;

        assert_eq!(result.flags["ok"], true);
        assert_eq!(result.flags["fail"], false);
        assert_eq!(result.flags["slow"], false);
        let ok = &result.snippets["ok"];
        assert_eq!(ok.len(), 2);
        assert!(ok.iter().all(|s| s.text.chars().count() <= 13));
        assert_eq!(result.snippets_for(&topics).len(), 2);
    }

    #[test]
    fn test_truncate_chars_on_boundaries() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("sesión larga", 6), "sesión...");
    }
}

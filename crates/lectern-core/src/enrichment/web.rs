//! DuckDuckGo instant-answer lookups.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::config::EnrichmentConfig;
use crate::error::{ErrorCode, LecternError, LecternResult};
use crate::traits::{EnrichmentSnippet, Enricher};

/// Enricher backed by the DuckDuckGo instant-answer API (no key required).
pub struct WebEnricher {
    client: Client,
    endpoint: Url,
    max_results: usize,
}

impl WebEnricher {
    pub fn new(config: &EnrichmentConfig) -> LecternResult<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| LecternError::Configuration(format!("invalid enrichment endpoint: {}", e)))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| LecternError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            max_results: config.max_snippets,
        })
    }

    fn query_url(&self, topic: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", topic)
            .append_pair("format", "json")
            .append_pair("no_html", "1")
            .append_pair("skip_disambig", "1");
        url
    }
}

/// Pull snippets out of an instant-answer response.
pub(crate) fn parse_instant_answer(topic: &str, body: &serde_json::Value, limit: usize) -> Vec<EnrichmentSnippet> {
    let mut snippets = Vec::new();

    if let Some(text) = body["AbstractText"].as_str().filter(|t| !t.is_empty()) {
        snippets.push(EnrichmentSnippet {
            topic: topic.to_string(),
            source: body["AbstractURL"].as_str().unwrap_or("duckduckgo").to_string(),
            text: text.to_string(),
        });
    }

    if let Some(related) = body["RelatedTopics"].as_array() {
        for item in related {
            if snippets.len() >= limit {
                break;
            }
            if let Some(text) = item["Text"].as_str() {
                snippets.push(EnrichmentSnippet {
                    topic: topic.to_string(),
                    source: item["FirstURL"].as_str().unwrap_or("duckduckgo").to_string(),
                    text: text.to_string(),
                });
            }
        }
    }

    snippets.truncate(limit);
    snippets
}

#[async_trait]
impl Enricher for WebEnricher {
    fn name(&self) -> &str {
        "web"
    }

    async fn lookup(&self, topic: &str) -> LecternResult<Vec<EnrichmentSnippet>> {
        let response = self
            .client
            .get(self.query_url(topic))
            .send()
            .await
            .map_err(|e| LecternError::transient("web", ErrorCode::PrvConnectionFailed, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LecternError::from_http_status("web", status.as_u16(), &body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LecternError::transient("web", ErrorCode::PrvInvalidResponse, e.to_string()))?;
        Ok(parse_instant_answer(topic, &body, self.max_results))
    }
}

//! Web enrichment through the DuckDuckGo Instant Answer API.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;

use crate::catalog::Domain;
use crate::error::EnrichmentError;

use super::{compose_context, ContextEnricher};

/// Instant Answer endpoint (no API key required).
pub const DUCKDUCKGO_API_URL: &str = "https://api.duckduckgo.com/";

/// Queries issued per enrichment.
pub const MAX_SEARCH_QUERIES: usize = 5;

/// Related topics kept per query.
const MAX_RELATED_TOPICS: usize = 3;

/// Keywords turned into guide queries.
const KEYWORD_QUERIES: usize = 3;

const LOOKUP_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("synth-forge/", env!("CARGO_PKG_VERSION"));

/// Subset of the Instant Answer response we read.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InstantAnswer {
    #[serde(rename = "Abstract")]
    abstract_text: String,
    #[serde(rename = "RelatedTopics")]
    related_topics: Vec<serde_json::Value>,
    #[serde(rename = "Answer")]
    answer: serde_json::Value,
}

impl InstantAnswer {
    /// Renders the useful parts as `Overview: ... | Related: ... | Answer: ...`.
    fn summarize(&self) -> Option<String> {
        let mut parts = Vec::new();

        if !self.abstract_text.trim().is_empty() {
            parts.push(format!("Overview: {}", self.abstract_text.trim()));
        }

        parts.extend(
            self.related_topics
                .iter()
                .take(MAX_RELATED_TOPICS)
                .filter_map(|topic| topic.get("Text").and_then(|t| t.as_str()))
                .filter(|text| !text.trim().is_empty())
                .map(|text| format!("Related: {}", text.trim())),
        );

        if let Some(answer) = self.answer.as_str().filter(|a| !a.trim().is_empty()) {
            parts.push(format!("Answer: {}", answer.trim()));
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" | "))
        }
    }
}

/// Enricher that researches a domain with concurrent web lookups.
pub struct WebContextEnricher {
    client: Client,
    endpoint: String,
}

impl Default for WebContextEnricher {
    fn default() -> Self {
        Self::new()
    }
}

impl WebContextEnricher {
    pub fn new() -> Self {
        Self::with_endpoint(DUCKDUCKGO_API_URL)
    }

    /// Uses a different Instant-Answer-compatible endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(LOOKUP_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Builds the research queries for a domain, capped at
    /// [`MAX_SEARCH_QUERIES`].
    pub fn search_queries(domain: Domain, hint: Option<&str>) -> Vec<String> {
        let mut queries: Vec<String> = [
            "best practices",
            "terminology glossary",
            "industry standards",
            "common procedures",
            "key concepts",
        ]
        .iter()
        .map(|topic| format!("{} {}", domain, topic))
        .collect();

        queries.extend(
            domain
                .keywords()
                .iter()
                .take(KEYWORD_QUERIES)
                .map(|keyword| format!("{} {} guide", keyword, domain)),
        );

        if let Some(hint) = hint.map(str::trim).filter(|h| !h.is_empty()) {
            // The focus query displaces the last generic one.
            queries.truncate(MAX_SEARCH_QUERIES - 1);
            queries.push(format!("{} {}", domain, hint));
        }

        queries.truncate(MAX_SEARCH_QUERIES);
        queries
    }

    /// Runs one lookup.
    async fn lookup(&self, query: &str) -> Result<String, EnrichmentError> {
        let url = Url::parse_with_params(
            &self.endpoint,
            &[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ],
        )
        .map_err(|e| EnrichmentError::RequestFailed(format!("invalid endpoint: {}", e)))?;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                EnrichmentError::Timeout {
                    seconds: LOOKUP_TIMEOUT_SECS,
                }
            } else {
                EnrichmentError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentError::RequestFailed(format!("HTTP {}", status)));
        }

        let answer: InstantAnswer = response
            .json()
            .await
            .map_err(|e| EnrichmentError::RequestFailed(format!("bad response body: {}", e)))?;

        answer
            .summarize()
            .ok_or_else(|| EnrichmentError::NoContent(query.to_string()))
    }
}

#[async_trait]
impl ContextEnricher for WebContextEnricher {
    async fn enrich(&self, domain: Domain, hint: Option<&str>) -> Result<String, EnrichmentError> {
        let queries = Self::search_queries(domain, hint);
        let results = join_all(queries.iter().map(|q| self.lookup(q))).await;

        let mut reached = 0usize;
        let mut last_error = None;
        let findings: Vec<String> = queries
            .iter()
            .zip(results)
            .map(|(query, result)| match result {
                Ok(text) => {
                    reached += 1;
                    text
                }
                Err(EnrichmentError::NoContent(_)) => {
                    reached += 1;
                    format!("General knowledge about {}", query)
                }
                Err(err) => {
                    tracing::debug!(query = %query, error = %err, "Lookup failed");
                    last_error = Some(err);
                    format!("General knowledge about {}", query)
                }
            })
            .collect();

        if reached == 0 {
            return Err(last_error.unwrap_or_else(|| EnrichmentError::NoContent(domain.to_string())));
        }

        tracing::info!(
            domain = %domain,
            queries = queries.len(),
            reached,
            "Web research complete"
        );

        Ok(compose_context(
            &domain.base_context(hint),
            Some(&findings.join(" | ")),
            domain,
            hint,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_queries_without_hint() {
        let queries = WebContextEnricher::search_queries(Domain::Finance, None);
        assert_eq!(queries.len(), MAX_SEARCH_QUERIES);
        assert_eq!(queries[0], "finance best practices");
        assert_eq!(queries[4], "finance key concepts");
    }

    #[test]
    fn test_search_queries_with_hint_keeps_focus() {
        let queries = WebContextEnricher::search_queries(Domain::Law, Some(" GDPR fines "));
        assert_eq!(queries.len(), MAX_SEARCH_QUERIES);
        assert_eq!(queries.last().map(String::as_str), Some("law GDPR fines"));
    }

    #[test]
    fn test_summarize_instant_answer() {
        let raw = serde_json::json!({
            "Abstract": "Triage is the sorting of patients.",
            "RelatedTopics": [
                {"Text": "Emergency department"},
                {"Name": "Category", "Topics": []},
                {"Text": "Field triage"},
                {"Text": "START triage"},
                {"Text": "Not reached"}
            ],
            "Answer": ""
        });
        let answer: InstantAnswer = serde_json::from_value(raw).unwrap();
        let summary = answer.summarize().unwrap();
        assert_eq!(
            summary,
            "Overview: Triage is the sorting of patients. | Related: Emergency department | Related: Field triage"
        );
    }

    #[test]
    fn test_summarize_empty_answer() {
        let answer: InstantAnswer = serde_json::from_str(r#"{"Abstract": "", "Answer": 42}"#).unwrap();
        assert!(answer.summarize().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_enrichment() {
        let enricher = WebContextEnricher::with_endpoint("http://localhost:65535/");
        let err = enricher
            .enrich(Domain::Technology, None)
            .await
            .expect_err("no server should be listening");
        assert!(matches!(
            err,
            EnrichmentError::RequestFailed(_) | EnrichmentError::Timeout { .. }
        ));
    }
}

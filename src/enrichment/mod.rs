//! Domain context enrichment.
//!
//! Before generating, a run gathers background material for its domain so
//! the model has concrete terminology and facts to draw on. Enrichment is
//! best-effort: the orchestrator falls back to the built-in domain overview
//! whenever an enricher fails or times out.
//!
//! Enrichers compose: [`ResearchEnricher`] wraps [`WebContextEnricher`] or
//! [`StaticContextEnricher`] and asks the model to distill what they found.

mod research;
mod web;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::Domain;
use crate::error::EnrichmentError;

pub use research::{parse_research, DomainResearch, ResearchConfig, ResearchEnricher};
pub use web::{WebContextEnricher, DUCKDUCKGO_API_URL, MAX_SEARCH_QUERIES};

/// Source of supplementary domain context.
#[async_trait]
pub trait ContextEnricher: Send + Sync {
    /// Returns context text for `domain`, optionally focused by `hint`.
    async fn enrich(&self, domain: Domain, hint: Option<&str>) -> Result<String, EnrichmentError>;
}

/// Context a run generates against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedContext {
    pub domain: Domain,
    /// The caller's own context string, if any.
    pub original_context: Option<String>,
    /// Text handed to the model.
    pub supplementary: String,
    /// Whether enrichment failed and the built-in overview was used.
    pub degraded: bool,
}

impl EnrichedContext {
    pub fn new(domain: Domain, original_context: Option<String>, supplementary: String) -> Self {
        Self {
            domain,
            original_context,
            supplementary,
            degraded: false,
        }
    }

    /// Context built from the domain overview alone.
    pub fn fallback(domain: Domain, original_context: Option<String>) -> Self {
        let supplementary = compose_context(
            &domain.base_context(original_context.as_deref()),
            None,
            domain,
            original_context.as_deref(),
        );
        Self {
            domain,
            original_context,
            supplementary,
            degraded: true,
        }
    }
}

/// Lays out the sections of an enriched context.
pub(crate) fn compose_context(
    base_context: &str,
    research: Option<&str>,
    domain: Domain,
    user_context: Option<&str>,
) -> String {
    let mut out = format!("Base Context: {}", base_context.trim());
    if let Some(research) = research.map(str::trim).filter(|r| !r.is_empty()) {
        out.push_str("\n\nWeb Research Results: ");
        out.push_str(research);
    }
    out.push_str("\n\nDomain Keywords: ");
    out.push_str(&domain.keywords().join(", "));
    if let Some(user) = user_context.map(str::trim).filter(|c| !c.is_empty()) {
        out.push_str("\nUser Specific Context: ");
        out.push_str(user);
    }
    out
}

/// Offline enricher built from the built-in domain tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticContextEnricher;

#[async_trait]
impl ContextEnricher for StaticContextEnricher {
    async fn enrich(&self, domain: Domain, hint: Option<&str>) -> Result<String, EnrichmentError> {
        let sources = format!(
            "Reference material typically drawn from {}.",
            domain.research_sources().join("; ")
        );
        Ok(compose_context(
            &domain.base_context(hint),
            Some(&sources),
            domain,
            hint,
        ))
    }
}

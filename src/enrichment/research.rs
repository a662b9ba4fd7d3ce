//! Model-driven domain research layered over another enricher.
//!
//! [`ResearchEnricher`] takes the text produced by an inner enricher (web
//! lookups or the static tables) and asks the model to distill it into a
//! domain overview, key concepts, terminology and a generation-ready context.
//! Any failure of the model step keeps the inner text as-is.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::Domain;
use crate::error::{EnrichmentError, LlmError};
use crate::llm::{CompletionRequest, LlmProvider, Message};
use crate::utils::json_extraction::try_extract_json_from_response;

use super::ContextEnricher;

/// Terms kept per list in the rendered context.
const MAX_LISTED_TERMS: usize = 20;

const RESEARCH_SYSTEM_PROMPT: &str = r#"You are a domain research expert. Work through the domain in explicit steps:
- Thought: analyze what needs to be understood about the domain
- Action: identify the key areas to investigate
- Observation: gather insights from the material provided
- Reflection: synthesize the findings into structured knowledge

Answer with a single JSON object and nothing after it:
{"domain_info": "...", "key_concepts": ["..."], "terminology": ["..."], "context_enriched": "..."}"#;

/// Settings for the research call.
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Limit on the model call alone; the inner enricher is not covered.
    pub timeout: Duration,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.7,
            max_tokens: 4000,
            timeout: Duration::from_secs(45),
        }
    }
}

impl ResearchConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Structured findings returned by the research call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainResearch {
    pub domain_info: String,
    pub key_concepts: Vec<String>,
    pub terminology: Vec<String>,
    pub context_enriched: String,
}

impl DomainResearch {
    fn is_empty(&self) -> bool {
        self.domain_info.trim().is_empty()
            && self.key_concepts.is_empty()
            && self.terminology.is_empty()
            && self.context_enriched.trim().is_empty()
    }

    /// Renders the findings as context text, keeping `source` when the model
    /// returned no enriched context of its own.
    pub fn render(&self, source: &str) -> String {
        let mut out = match self.context_enriched.trim() {
            "" => source.trim().to_string(),
            enriched => enriched.to_string(),
        };
        if !self.domain_info.trim().is_empty() {
            out.push_str("\n\nDomain Overview: ");
            out.push_str(self.domain_info.trim());
        }
        push_list(&mut out, "Key Concepts", &self.key_concepts);
        push_list(&mut out, "Terminology", &self.terminology);
        out
    }
}

fn push_list(out: &mut String, label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let listed: Vec<&str> = items
        .iter()
        .take(MAX_LISTED_TERMS)
        .map(String::as_str)
        .collect();
    out.push_str(&format!("\n{}: {}", label, listed.join(", ")));
}

/// Loose shape of the model's answer; list entries may be plain strings or
/// small objects.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LlmResearchResponse {
    domain_info: Value,
    key_concepts: Vec<Value>,
    terminology: Vec<Value>,
    context_enriched: Value,
}

impl From<LlmResearchResponse> for DomainResearch {
    fn from(raw: LlmResearchResponse) -> Self {
        Self {
            domain_info: text_of(&raw.domain_info).unwrap_or_default(),
            key_concepts: raw.key_concepts.iter().filter_map(text_of).collect(),
            terminology: raw.terminology.iter().filter_map(text_of).collect(),
            context_enriched: text_of(&raw.context_enriched).unwrap_or_default(),
        }
    }
}

/// Keys that name an entry when the model answers with objects.
const LABEL_KEYS: &[&str] = &["term", "name", "concept", "title"];

/// A string value, or the label of an object such as
/// `{"term": "triage", "definition": "..."}`.
fn text_of(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => LABEL_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .or_else(|| map.values().find_map(Value::as_str))?,
        _ => return None,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Why the research step was skipped.
#[derive(Debug)]
enum ResearchFailure {
    Llm(LlmError),
    TimedOut(Duration),
    Unparseable(String),
    Empty,
}

impl fmt::Display for ResearchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResearchFailure::Llm(err) => write!(f, "{}", err),
            ResearchFailure::TimedOut(limit) => {
                write!(f, "research timed out after {}s", limit.as_secs())
            }
            ResearchFailure::Unparseable(err) => write!(f, "unparseable research: {}", err),
            ResearchFailure::Empty => write!(f, "research returned no findings"),
        }
    }
}

/// Parses a research reply into findings.
pub fn parse_research(content: &str) -> Result<DomainResearch, String> {
    let json = try_extract_json_from_response(content)
        .into_result_with_context(content)
        .map_err(|e| e.to_string())?;
    let raw: LlmResearchResponse = serde_json::from_str(&json).map_err(|e| {
        format!(
            "{}. Content: {}",
            e,
            json.chars().take(200).collect::<String>()
        )
    })?;
    Ok(raw.into())
}

/// Enricher that runs `inner` and then refines its text with the model.
pub struct ResearchEnricher {
    inner: Arc<dyn ContextEnricher>,
    llm: Arc<dyn LlmProvider>,
    config: ResearchConfig,
}

impl fmt::Debug for ResearchEnricher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResearchEnricher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ResearchEnricher {
    pub fn new(
        inner: Arc<dyn ContextEnricher>,
        llm: Arc<dyn LlmProvider>,
        config: ResearchConfig,
    ) -> Self {
        Self { inner, llm, config }
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    async fn research(&self, domain: Domain, source: &str) -> Result<DomainResearch, ResearchFailure> {
        let request = CompletionRequest::new(
            self.config.model.clone(),
            vec![
                Message::system(RESEARCH_SYSTEM_PROMPT),
                Message::user(build_research_prompt(domain, source)),
            ],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = tokio::time::timeout(self.config.timeout, self.llm.generate(request))
            .await
            .map_err(|_| ResearchFailure::TimedOut(self.config.timeout))?
            .map_err(ResearchFailure::Llm)?;

        let content = response.first_content().unwrap_or_default();
        let research = parse_research(content).map_err(ResearchFailure::Unparseable)?;
        if research.is_empty() {
            return Err(ResearchFailure::Empty);
        }
        Ok(research)
    }
}

#[async_trait]
impl ContextEnricher for ResearchEnricher {
    async fn enrich(&self, domain: Domain, hint: Option<&str>) -> Result<String, EnrichmentError> {
        let source = self.inner.enrich(domain, hint).await?;

        match self.research(domain, &source).await {
            Ok(research) => {
                tracing::info!(
                    domain = %domain,
                    concepts = research.key_concepts.len(),
                    terms = research.terminology.len(),
                    "Domain research completed"
                );
                Ok(research.render(&source))
            }
            Err(failure) => {
                tracing::warn!(domain = %domain, reason = %failure, "Domain research failed, keeping gathered context");
                Ok(source)
            }
        }
    }
}

fn build_research_prompt(domain: Domain, source: &str) -> String {
    format!(
        r#"Domain: {domain}
Context: {source}

Thought: I need to understand the core aspects of the {domain} domain including key terminology, common concepts, typical scenarios and relevant contexts.

Action: Research the following areas:
1. Key terminology and jargon specific to {domain}
2. Common processes, procedures, or workflows
3. Typical challenges and problem areas
4. Industry standards and best practices
5. Current trends and developments

Observation: [analyze the domain using the context above]

Reflection: [synthesize the findings into actionable knowledge]

Respond with JSON containing:
- domain_info: comprehensive domain overview
- key_concepts: list of key concepts
- terminology: list of domain-specific terms
- context_enriched: enhanced context for data generation"#,
        domain = domain,
        source = source.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::StaticContextEnricher;
    use crate::llm::{Choice, CompletionResponse, Usage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedLlm {
        reply: Mutex<Option<Result<String, LlmError>>>,
        call_count: AtomicUsize,
    }

    impl ScriptedLlm {
        fn new(reply: Result<String, LlmError>) -> Self {
            Self {
                reply: Mutex::new(Some(reply)),
                call_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn generate(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            assert!(request.messages[1].content.contains("Context: Base Context:"));
            let content = self
                .reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(String::new()))?;
            Ok(CompletionResponse {
                id: "research".to_string(),
                model: "scripted".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(content),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage::default(),
            })
        }
    }

    /// Never answers within the research timeout.
    struct SilentLlm;

    #[async_trait]
    impl LlmProvider for SilentLlm {
        async fn generate(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(LlmError::Timeout { seconds: 3600 })
        }
    }

    fn enricher(llm: Arc<dyn LlmProvider>) -> ResearchEnricher {
        ResearchEnricher::new(
            Arc::new(StaticContextEnricher),
            llm,
            ResearchConfig::new("test-model"),
        )
    }

    async fn static_text(domain: Domain, hint: Option<&str>) -> String {
        StaticContextEnricher.enrich(domain, hint).await.unwrap()
    }

    #[tokio::test]
    async fn test_research_refines_context() {
        let reply = r#"Thought: triage and dosing matter most.
```json
{
  "domain_info": "Clinical care spans diagnosis, treatment and follow-up.",
  "key_concepts": ["triage", {"name": "informed consent", "detail": "patient agreement"}],
  "terminology": ["comorbidity", "contraindication", 42],
  "context_enriched": "Emergency departments prioritise patients by acuity."
}
```"#;
        let llm = Arc::new(ScriptedLlm::new(Ok(reply.to_string())));
        let text = enricher(llm.clone())
            .enrich(Domain::Healthcare, Some("emergency medicine"))
            .await
            .unwrap();

        assert_eq!(llm.call_count.load(Ordering::SeqCst), 1);
        assert!(text.starts_with("Emergency departments prioritise patients by acuity."));
        assert!(text.contains("Domain Overview: Clinical care spans"));
        assert!(text.contains("Key Concepts: triage, informed consent"));
        assert!(text.contains("Terminology: comorbidity, contraindication"));
        assert!(!text.contains("42"));
    }

    #[tokio::test]
    async fn test_missing_enriched_context_keeps_source() {
        let reply = r#"{"domain_info": "", "key_concepts": [], "terminology": ["escrow"], "context_enriched": ""}"#;
        let llm = Arc::new(ScriptedLlm::new(Ok(reply.to_string())));
        let text = enricher(llm).enrich(Domain::Finance, None).await.unwrap();

        let source = static_text(Domain::Finance, None).await;
        assert!(text.starts_with(&source));
        assert!(text.ends_with("\nTerminology: escrow"));
    }

    #[tokio::test]
    async fn test_llm_error_falls_back_to_source() {
        let llm = Arc::new(ScriptedLlm::new(Err(LlmError::RateLimited("slow down".to_string()))));
        let text = enricher(llm.clone())
            .enrich(Domain::Law, Some("tenancy disputes"))
            .await
            .unwrap();

        assert_eq!(llm.call_count.load(Ordering::SeqCst), 1);
        assert_eq!(text, static_text(Domain::Law, Some("tenancy disputes")).await);
    }

    #[tokio::test]
    async fn test_unparseable_reply_falls_back_to_source() {
        let llm = Arc::new(ScriptedLlm::new(Ok("I would rather not.".to_string())));
        let text = enricher(llm).enrich(Domain::Education, None).await.unwrap();
        assert_eq!(text, static_text(Domain::Education, None).await);
    }

    #[tokio::test]
    async fn test_empty_findings_fall_back_to_source() {
        let llm = Arc::new(ScriptedLlm::new(Ok("{\"key_concepts\": []}".to_string())));
        let text = enricher(llm).enrich(Domain::Technology, None).await.unwrap();
        assert_eq!(text, static_text(Domain::Technology, None).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_research_timeout_falls_back_to_source() {
        let research = ResearchEnricher::new(
            Arc::new(StaticContextEnricher),
            Arc::new(SilentLlm),
            ResearchConfig::new("test-model").with_timeout(Duration::from_secs(5)),
        );
        let text = research.enrich(Domain::Healthcare, None).await.unwrap();
        assert_eq!(text, static_text(Domain::Healthcare, None).await);
    }

    #[test]
    fn test_parse_research_rejects_prose() {
        assert!(parse_research("no findings today").is_err());
    }
}

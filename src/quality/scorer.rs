//! Heuristic quality scoring for validated records.
//!
//! Three cheap signals are combined into a weighted score in `[0, 1]`:
//! length adequacy, absence of boilerplate, and presence of domain terms.

use crate::catalog::Domain;
use crate::records::Record;

/// Default weight for length adequacy.
const DEFAULT_LENGTH_WEIGHT: f64 = 0.4;

/// Default weight for the boilerplate check.
const DEFAULT_BOILERPLATE_WEIGHT: f64 = 0.35;

/// Default weight for domain-term presence.
const DEFAULT_DOMAIN_WEIGHT: f64 = 0.25;

/// Default minimum overall score.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.5;

/// Distinct domain terms needed for a full domain score.
const DOMAIN_TERMS_FOR_FULL_SCORE: usize = 2;

/// Fraction of a field's target length below which a field is flagged.
const SHORT_FIELD_RATIO: f64 = 0.3;

/// Values that are nothing but a stand-in when they fill a prose field.
const PLACEHOLDER_VALUES: &[&str] = &[
    "placeholder",
    "lorem ipsum",
    "example",
    "sample",
    "test",
    "...",
    "todo",
    "tbd",
    "n/a",
    "your answer here",
];

/// Template residue that should never appear inside real prose.
const TEMPLATE_MARKERS: &[&str] = &[
    "lorem ipsum",
    "[insert",
    "<insert",
    "your answer here",
    "placeholder",
    "todo:",
    "tbd",
    "{{",
];

/// Quality issue severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Critical issues that cause immediate failure.
    Critical,
    /// Major issues that significantly reduce score.
    Major,
    /// Minor issues that slightly reduce score.
    Minor,
    /// Warnings that are logged but don't affect score.
    Warning,
}

impl Severity {
    /// Returns the score penalty associated with this severity.
    pub fn penalty(&self) -> f64 {
        match self {
            Severity::Critical => 1.0,
            Severity::Major => 0.5,
            Severity::Minor => 0.1,
            Severity::Warning => 0.0,
        }
    }
}

/// Types of quality issues that can be detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityIssueType {
    /// A field holds nothing but a placeholder value.
    PlaceholderValue,
    /// A field contains template residue.
    TemplateMarker,
    /// A field is far shorter than expected.
    TooShort,
    /// No domain vocabulary appears anywhere in the record.
    OffDomain,
}

impl std::fmt::Display for QualityIssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QualityIssueType::PlaceholderValue => "PlaceholderValue",
            QualityIssueType::TemplateMarker => "TemplateMarker",
            QualityIssueType::TooShort => "TooShort",
            QualityIssueType::OffDomain => "OffDomain",
        };
        write!(f, "{}", name)
    }
}

/// A quality issue detected in a record.
#[derive(Debug, Clone)]
pub struct QualityIssue {
    /// The type of quality issue.
    pub issue_type: QualityIssueType,
    /// The severity of the issue.
    pub severity: Severity,
    /// A human-readable description of the issue.
    pub description: String,
    /// The field the issue was found in, if applicable.
    pub field: Option<&'static str>,
}

impl QualityIssue {
    /// Creates a new quality issue.
    pub fn new(
        issue_type: QualityIssueType,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            issue_type,
            severity,
            description: description.into(),
            field: None,
        }
    }

    /// Creates a new quality issue attached to a field.
    pub fn in_field(
        issue_type: QualityIssueType,
        severity: Severity,
        description: impl Into<String>,
        field: &'static str,
    ) -> Self {
        Self {
            field: Some(field),
            ..Self::new(issue_type, severity, description)
        }
    }
}

/// The result of scoring one record.
#[derive(Debug, Clone)]
pub struct QualityResult {
    /// Length adequacy score (0.0 - 1.0).
    pub length_score: f64,
    /// Boilerplate absence score (0.0 - 1.0).
    pub boilerplate_score: f64,
    /// Domain-term presence score (0.0 - 1.0).
    pub domain_score: f64,
    /// Overall weighted score (0.0 - 1.0).
    pub overall_score: f64,
    /// Whether the record passed.
    pub passed: bool,
    /// List of quality issues found.
    pub issues: Vec<QualityIssue>,
}

impl QualityResult {
    /// Comma-separated issue descriptions, for logging.
    pub fn issue_summary(&self) -> String {
        self.issues
            .iter()
            .map(|i| format!("{}: {}", i.issue_type, i.description))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Scores records and filters those below a threshold.
#[derive(Debug, Clone)]
pub struct QualityScorer {
    min_overall_score: f64,
    length_weight: f64,
    boilerplate_weight: f64,
    domain_weight: f64,
    extra_terms: Vec<String>,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY_THRESHOLD)
    }
}

impl QualityScorer {
    /// Creates a scorer with the given minimum score.
    pub fn new(min_overall_score: f64) -> Self {
        Self {
            min_overall_score: min_overall_score.clamp(0.0, 1.0),
            length_weight: DEFAULT_LENGTH_WEIGHT,
            boilerplate_weight: DEFAULT_BOILERPLATE_WEIGHT,
            domain_weight: DEFAULT_DOMAIN_WEIGHT,
            extra_terms: Vec::new(),
        }
    }

    /// Sets custom weights for the components.
    ///
    /// Weights are normalized so they sum to 1.0.
    pub fn with_weights(mut self, length: f64, boilerplate: f64, domain: f64) -> Self {
        let (length, boilerplate, domain) = (length.max(0.0), boilerplate.max(0.0), domain.max(0.0));
        let total = length + boilerplate + domain;
        if total > 0.0 {
            self.length_weight = length / total;
            self.boilerplate_weight = boilerplate / total;
            self.domain_weight = domain / total;
        }
        self
    }

    /// Adds vocabulary counted as on-domain in addition to the built-in
    /// domain lexicon.
    pub fn with_extra_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_terms
            .extend(terms.into_iter().map(|t| t.into().to_lowercase()));
        self
    }

    /// Returns the minimum passing score.
    pub fn threshold(&self) -> f64 {
        self.min_overall_score
    }

    /// Scores a record for the given domain.
    pub fn score(&self, domain: Domain, record: &Record) -> QualityResult {
        let fields = record.field_values();
        let mut issues = Vec::new();

        let length_score = length_adequacy(&fields, &mut issues);
        let boilerplate_score =
            boilerplate_absence(&fields, record.format().prose_fields(), &mut issues);
        let domain_score = self.domain_presence(domain, &fields, &mut issues);

        let overall_score = self.length_weight * length_score
            + self.boilerplate_weight * boilerplate_score
            + self.domain_weight * domain_score;

        let has_critical = issues.iter().any(|i| i.severity == Severity::Critical);
        let passed = !has_critical && overall_score >= self.min_overall_score;

        QualityResult {
            length_score,
            boilerplate_score,
            domain_score,
            overall_score,
            passed,
            issues,
        }
    }

    fn domain_presence(
        &self,
        domain: Domain,
        fields: &[(&'static str, String)],
        issues: &mut Vec<QualityIssue>,
    ) -> f64 {
        let words: Vec<String> = fields
            .iter()
            .filter(|(name, _)| *name != "metadata")
            .flat_map(|(_, value)| {
                value
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                    .map(str::to_lowercase)
                    .collect::<Vec<_>>()
            })
            .collect();

        let lexicon = domain
            .keywords()
            .iter()
            .map(|k| k.to_lowercase())
            .chain(self.extra_terms.iter().cloned());

        let hits = lexicon
            .filter(|term| words.iter().any(|w| term_matches(w, term)))
            .count();

        if hits == 0 {
            issues.push(QualityIssue::new(
                QualityIssueType::OffDomain,
                Severity::Warning,
                format!("no {} vocabulary found", domain),
            ));
        }

        (hits as f64 / DOMAIN_TERMS_FOR_FULL_SCORE as f64).min(1.0)
    }
}

/// A word matches a term exactly, or by prefix for terms long enough that
/// prefixes are meaningful ("patient" matches "patients").
fn term_matches(word: &str, term: &str) -> bool {
    if term.chars().count() <= 3 {
        word == term
    } else {
        word.starts_with(term)
    }
}

/// Target length in characters for each field; `None` means the field is
/// optional or structured and does not count toward length adequacy.
fn target_length(field: &str) -> Option<usize> {
    match field {
        "question" => Some(40),
        "answer" => Some(120),
        "context" => Some(60),
        "entity1" | "entity2" | "relationship" => Some(3),
        "content" => Some(200),
        "summary" => Some(30),
        "instruction" => Some(30),
        "output" => Some(60),
        _ => None,
    }
}

fn length_adequacy(fields: &[(&'static str, String)], issues: &mut Vec<QualityIssue>) -> f64 {
    let mut total = 0.0;
    let mut counted = 0usize;

    for (name, value) in fields {
        let Some(target) = target_length(name) else {
            continue;
        };
        let len = value.chars().count();
        // Context is optional; an empty one neither helps nor hurts.
        if *name == "context" && len == 0 {
            continue;
        }

        let ratio = len as f64 / target as f64;
        if ratio < SHORT_FIELD_RATIO {
            issues.push(QualityIssue::in_field(
                QualityIssueType::TooShort,
                Severity::Minor,
                format!("{} is {} chars, expected around {}", name, len, target),
                name,
            ));
        }
        total += ratio.min(1.0);
        counted += 1;
    }

    if counted == 0 {
        1.0
    } else {
        total / counted as f64
    }
}

fn boilerplate_absence(
    fields: &[(&'static str, String)],
    prose_fields: &[&str],
    issues: &mut Vec<QualityIssue>,
) -> f64 {
    let mut penalty = 0.0;

    for (name, value) in fields {
        let normalized = value.trim().to_lowercase();
        if normalized.is_empty() {
            continue;
        }

        let is_prose = prose_fields.contains(name);
        let issue = if is_prose && PLACEHOLDER_VALUES.contains(&normalized.as_str()) {
            Some(QualityIssue::in_field(
                QualityIssueType::PlaceholderValue,
                Severity::Critical,
                format!("{} is a placeholder ('{}')", name, value.trim()),
                name,
            ))
        } else {
            TEMPLATE_MARKERS
                .iter()
                .find(|marker| normalized.contains(*marker))
                .map(|marker| {
                    QualityIssue::in_field(
                        QualityIssueType::TemplateMarker,
                        Severity::Major,
                        format!("{} contains template marker '{}'", name, marker),
                        name,
                    )
                })
        };

        if let Some(issue) = issue {
            penalty += issue.severity.penalty();
            issues.push(issue);
        }
    }

    (1.0 - penalty).max(0.0)
}

//! Knowledge domains the forge can generate records for.
//!
//! Each domain carries a lexicon used by quality scoring, a list of research
//! sources that steer enrichment queries, and a built-in overview paragraph
//! used whenever live enrichment is unavailable.

use serde::{Deserialize, Serialize};

/// A supported knowledge domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Healthcare,
    Finance,
    Business,
    Law,
    Technology,
    Education,
}

impl Domain {
    /// Returns all supported domains.
    pub fn all() -> Vec<Domain> {
        vec![
            Domain::Healthcare,
            Domain::Finance,
            Domain::Business,
            Domain::Law,
            Domain::Technology,
            Domain::Education,
        ]
    }

    /// Returns the identifier used on the command line and in file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Healthcare => "healthcare",
            Domain::Finance => "finance",
            Domain::Business => "business",
            Domain::Law => "law",
            Domain::Technology => "technology",
            Domain::Education => "education",
        }
    }

    /// Returns a short description of what the domain covers.
    pub fn description(&self) -> &'static str {
        match self {
            Domain::Healthcare => {
                "Medical, pharmaceutical, clinical research, patient care, diagnostics"
            }
            Domain::Finance => {
                "Banking, investments, trading, financial planning, risk management"
            }
            Domain::Business => "Management, operations, strategy, marketing, entrepreneurship",
            Domain::Law => "Legal procedures, contracts, regulations, compliance, litigation",
            Domain::Technology => "Software development, AI/ML, cybersecurity, cloud computing",
            Domain::Education => {
                "Learning, curriculum, pedagogy, assessment, educational technology"
            }
        }
    }

    /// Returns the domain lexicon.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Domain::Healthcare => &[
                "medical",
                "patient",
                "diagnosis",
                "treatment",
                "healthcare",
                "clinical",
            ],
            Domain::Finance => &[
                "banking",
                "investment",
                "finance",
                "trading",
                "risk",
                "financial",
            ],
            Domain::Business => &[
                "business",
                "strategy",
                "management",
                "operations",
                "marketing",
            ],
            Domain::Law => &[
                "legal",
                "law",
                "contract",
                "regulation",
                "compliance",
                "court",
            ],
            Domain::Technology => &[
                "technology",
                "software",
                "AI",
                "cybersecurity",
                "cloud",
                "development",
            ],
            Domain::Education => &[
                "education",
                "learning",
                "curriculum",
                "teaching",
                "assessment",
            ],
        }
    }

    /// Returns the kinds of sources a researcher would consult.
    pub fn research_sources(&self) -> &'static [&'static str] {
        match self {
            Domain::Healthcare => &[
                "medical journals and publications",
                "clinical research databases",
                "healthcare guidelines and protocols",
                "medical terminology resources",
                "patient care standards",
            ],
            Domain::Finance => &[
                "financial regulations and compliance",
                "investment and trading platforms",
                "banking procedures and policies",
                "risk management frameworks",
                "financial market analysis",
            ],
            Domain::Business => &[
                "business strategy frameworks",
                "management best practices",
                "operational procedures",
                "marketing and sales methodologies",
                "entrepreneurship resources",
            ],
            Domain::Law => &[
                "legal statutes and regulations",
                "court procedures and protocols",
                "contract law and agreements",
                "compliance and regulatory frameworks",
                "legal precedents and case studies",
            ],
            Domain::Technology => &[
                "software development practices",
                "AI and machine learning concepts",
                "cybersecurity frameworks",
                "cloud computing architectures",
                "technology standards and protocols",
            ],
            Domain::Education => &[
                "pedagogical methodologies",
                "curriculum development frameworks",
                "educational assessment techniques",
                "learning technologies and tools",
                "educational psychology research",
            ],
        }
    }

    fn overview(&self) -> &'static str {
        match self {
            Domain::Healthcare => {
                "Healthcare domain encompasses medical practice, patient care, clinical research, \
                 pharmaceutical development, medical devices, healthcare administration, and public \
                 health initiatives. Key areas include diagnosis, treatment protocols, preventive \
                 care, medical ethics, and healthcare technology."
            }
            Domain::Finance => {
                "Finance domain covers banking services, investment management, financial planning, \
                 risk assessment, insurance, regulatory compliance, and financial markets. Key areas \
                 include portfolio management, credit analysis, financial modeling, and regulatory \
                 frameworks."
            }
            Domain::Business => {
                "Business domain includes strategic planning, operations management, marketing, \
                 sales, human resources, and organizational development. Key areas include business \
                 models, competitive analysis, process optimization, and stakeholder management."
            }
            Domain::Law => {
                "Legal domain encompasses various practice areas including corporate law, \
                 litigation, regulatory compliance, contract negotiation, and legal advisory \
                 services. Key areas include legal research, case analysis, document preparation, \
                 and client representation."
            }
            Domain::Technology => {
                "Technology domain includes software development, system architecture, \
                 cybersecurity, artificial intelligence, cloud computing, and emerging \
                 technologies. Key areas include programming, system design, security protocols, \
                 and technology innovation."
            }
            Domain::Education => {
                "Education domain covers teaching methodologies, curriculum design, student \
                 assessment, educational technology, and academic administration. Key areas include \
                 learning theories, instructional design, educational psychology, and institutional \
                 management."
            }
        }
    }

    /// Returns the built-in overview, with the caller's focus appended when
    /// one is given.
    pub fn base_context(&self, user_context: Option<&str>) -> String {
        match user_context.map(str::trim).filter(|c| !c.is_empty()) {
            Some(focus) => format!("{} Specific focus: {}", self.overview(), focus),
            None => self.overview().to_string(),
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "healthcare" => Ok(Domain::Healthcare),
            "finance" => Ok(Domain::Finance),
            "business" => Ok(Domain::Business),
            "law" | "legal" => Ok(Domain::Law),
            "technology" | "tech" => Ok(Domain::Technology),
            "education" => Ok(Domain::Education),
            other => Err(format!(
                "Unknown domain: '{}'. Supported domains: {}",
                other,
                Domain::all()
                    .iter()
                    .map(Domain::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_str() {
        for domain in Domain::all() {
            let parsed: Domain = domain.to_string().parse().unwrap();
            assert_eq!(parsed, domain);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive_with_aliases() {
        assert_eq!("Healthcare".parse::<Domain>().unwrap(), Domain::Healthcare);
        assert_eq!(" legal ".parse::<Domain>().unwrap(), Domain::Law);
    }

    #[test]
    fn test_unknown_domain_lists_choices() {
        let err = "astrology".parse::<Domain>().unwrap_err();
        assert!(err.contains("astrology"));
        assert!(err.contains("healthcare"));
    }

    #[test]
    fn test_every_domain_has_lexicon_and_sources() {
        for domain in Domain::all() {
            assert!(domain.keywords().len() >= 5, "{domain} lexicon too small");
            assert_eq!(domain.research_sources().len(), 5);
            assert!(!domain.description().is_empty());
        }
    }

    #[test]
    fn test_base_context_with_focus() {
        let plain = Domain::Finance.base_context(None);
        assert!(plain.starts_with("Finance domain"));
        assert!(!plain.contains("Specific focus"));

        let focused = Domain::Finance.base_context(Some("credit default swaps"));
        assert!(focused.ends_with("Specific focus: credit default swaps"));

        assert_eq!(Domain::Finance.base_context(Some("   ")), plain);
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&Domain::Technology).unwrap();
        assert_eq!(json, "\"technology\"");
    }
}

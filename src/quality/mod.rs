//! Quality scoring for validated records.
//!
//! This module scores records on length adequacy, absence of boilerplate,
//! and presence of domain vocabulary, and rejects those below a threshold.

mod scorer;

pub use scorer::{
    QualityIssue, QualityIssueType, QualityResult, QualityScorer, Severity,
    DEFAULT_QUALITY_THRESHOLD,
};

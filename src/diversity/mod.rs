//! Duplicate detection across a generation run.
//!
//! Every accepted record is reduced to a normalized content signature; a
//! candidate whose signature has been seen before is rejected. Normalization
//! makes case, whitespace, edge punctuation and stop-word variants of the
//! same record collide:
//!
//! ```
//! use synth_forge::diversity::{DedupIndex, DedupSignature};
//! use synth_forge::records::Record;
//!
//! let record = Record::FineTuning {
//!     instruction: "Explain amortization".to_string(),
//!     input: String::new(),
//!     output: "Spreading a loan's repayment over time.".to_string(),
//! };
//! let mut index = DedupIndex::new();
//! let signature = DedupSignature::of(&record);
//! assert!(!index.contains(&signature));
//! index.insert(signature);
//! ```

pub mod dedup;

pub use dedup::{normalize_text, DedupIndex, DedupSignature};

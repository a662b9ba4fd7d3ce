//! Candidate records as proposed by the model and accepted records as
//! written to the dataset.

mod types;

pub use types::{Candidate, Record};

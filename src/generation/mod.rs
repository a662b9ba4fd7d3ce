//! Batch generation against the model.
//!
//! - [`prompts`]: the reasoning-protocol prompt text
//! - [`requester`]: one batch request with bounded retry and response parsing

pub mod prompts;
pub mod requester;

pub use requester::{parse_candidates, BatchFailure, BatchOutcome, BatchRequest, BatchRequester};

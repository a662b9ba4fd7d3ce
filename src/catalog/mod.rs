//! Closed registries of supported domains and record formats.

mod domain;
mod format;

pub use domain::Domain;
pub use format::DataFormat;

//! Export module for generated datasets.
//!
//! Provides CSV export of accepted records and helpers to inspect and prune
//! previously written files.

pub mod csv;

pub use csv::{
    file_stats, read_sample, sanitize_filename, CsvExporter, FileStats, DEFAULT_OUTPUT_DIR,
};

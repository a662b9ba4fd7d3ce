//! Pipeline configuration for the generation orchestrator.
//!
//! This module provides the static settings of a generation run: request
//! limits, batching and retry ceilings, quality filtering, timeouts, and
//! model parameters. Configuration is read once, outside any run, from
//! defaults, environment variables, or a YAML file.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::llm::DEFAULT_MODEL;

/// Smallest batch the requester may ask for.
pub const MIN_BATCH_SIZE: usize = 10;

/// Largest batch the requester may ask for.
pub const MAX_BATCH_SIZE: usize = 15;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable or file entry has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The configuration file is not valid YAML for this schema.
    #[error("Invalid configuration file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for the generation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    // Request limits
    /// Largest `target_count` a request may ask for.
    pub max_target_count: usize,

    // Batching and retry
    /// Records requested per batch (10..=15).
    pub batch_size: usize,
    /// Attempts per batch before it counts as failed.
    pub max_attempts_per_batch: u32,
    /// Hard ceiling on batches per run.
    pub max_batches: u32,
    /// Consecutive zero-yield batches that end a run.
    pub max_consecutive_empty_batches: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_backoff: Duration,
    /// Recent accepted records shown to the model as an avoid-list.
    pub avoid_list_size: usize,

    // Quality
    /// Minimum quality score for a record to be accepted.
    pub quality_threshold: f64,
    /// Vocabulary counted as on-domain in addition to the built-in lexicon.
    pub extra_domain_terms: Vec<String>,

    // Timeouts
    /// Timeout for one generation attempt.
    pub generation_timeout: Duration,
    /// Timeout for context enrichment.
    pub enrichment_timeout: Duration,

    // LLM settings
    /// Model identifier passed to the provider.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Completion token budget per batch.
    pub max_tokens: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_target_count: 1000,

            batch_size: MAX_BATCH_SIZE,
            max_attempts_per_batch: 3,
            max_batches: 100,
            max_consecutive_empty_batches: 3,
            base_backoff: Duration::from_millis(1000),
            avoid_list_size: 30,

            quality_threshold: 0.5,
            extra_domain_terms: Vec::new(),

            generation_timeout: Duration::from_secs(120),
            enrichment_timeout: Duration::from_secs(90),

            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 4000,
        }
    }
}

/// On-disk shape of the configuration; every key is optional and
/// overrides the default.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    max_target_count: Option<usize>,
    batch_size: Option<usize>,
    max_attempts_per_batch: Option<u32>,
    max_batches: Option<u32>,
    max_consecutive_empty_batches: Option<u32>,
    base_backoff_ms: Option<u64>,
    avoid_list_size: Option<usize>,
    quality_threshold: Option<f64>,
    extra_domain_terms: Option<Vec<String>>,
    generation_timeout_secs: Option<u64>,
    enrichment_timeout_secs: Option<u64>,
    model: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

impl ConfigFile {
    fn apply(self, config: &mut PipelineConfig) {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if let Some(v) = self.$field { config.$field = v; })*
            };
        }
        overlay!(
            max_target_count,
            batch_size,
            max_attempts_per_batch,
            max_batches,
            max_consecutive_empty_batches,
            avoid_list_size,
            quality_threshold,
            extra_domain_terms,
            model,
            temperature,
            max_tokens
        );
        if let Some(ms) = self.base_backoff_ms {
            config.base_backoff = Duration::from_millis(ms);
        }
        if let Some(secs) = self.generation_timeout_secs {
            config.generation_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.enrichment_timeout_secs {
            config.enrichment_timeout = Duration::from_secs(secs);
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FORGE_MAX_RECORDS_PER_REQUEST`: Largest target count (default: 1000)
    /// - `FORGE_BATCH_SIZE`: Records per batch, 10..=15 (default: 15)
    /// - `FORGE_MAX_RETRIES`: Attempts per batch (default: 3)
    /// - `FORGE_MAX_BATCHES`: Batch ceiling per run (default: 100)
    /// - `FORGE_MAX_EMPTY_BATCHES`: Consecutive empty batches allowed (default: 3)
    /// - `FORGE_BACKOFF_MS`: Base retry backoff in milliseconds (default: 1000)
    /// - `FORGE_AVOID_LIST_SIZE`: Avoid-list length (default: 30)
    /// - `FORGE_QUALITY_THRESHOLD`: Minimum quality score (default: 0.5)
    /// - `FORGE_DOMAIN_TERMS`: Comma-separated extra domain vocabulary
    /// - `FORGE_GENERATION_TIMEOUT_SECS`: Per-attempt timeout (default: 120)
    /// - `FORGE_ENRICHMENT_TIMEOUT_SECS`: Enrichment timeout (default: 30)
    /// - `FORGE_MODEL`: Model identifier
    /// - `FORGE_TEMPERATURE`: Sampling temperature (default: 0.7)
    /// - `FORGE_MAX_TOKENS`: Completion token budget (default: 4000)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`PipelineConfig::from_env`], reading variables through
    /// `lookup` instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("FORGE_MAX_RECORDS_PER_REQUEST") {
            config.max_target_count = parse_env_value(&val, "FORGE_MAX_RECORDS_PER_REQUEST")?;
        }

        if let Some(val) = lookup("FORGE_BATCH_SIZE") {
            config.batch_size = parse_env_value(&val, "FORGE_BATCH_SIZE")?;
        }

        if let Some(val) = lookup("FORGE_MAX_RETRIES") {
            config.max_attempts_per_batch = parse_env_value(&val, "FORGE_MAX_RETRIES")?;
        }

        if let Some(val) = lookup("FORGE_MAX_BATCHES") {
            config.max_batches = parse_env_value(&val, "FORGE_MAX_BATCHES")?;
        }

        if let Some(val) = lookup("FORGE_MAX_EMPTY_BATCHES") {
            config.max_consecutive_empty_batches =
                parse_env_value(&val, "FORGE_MAX_EMPTY_BATCHES")?;
        }

        if let Some(val) = lookup("FORGE_BACKOFF_MS") {
            let ms: u64 = parse_env_value(&val, "FORGE_BACKOFF_MS")?;
            config.base_backoff = Duration::from_millis(ms);
        }

        if let Some(val) = lookup("FORGE_AVOID_LIST_SIZE") {
            config.avoid_list_size = parse_env_value(&val, "FORGE_AVOID_LIST_SIZE")?;
        }

        if let Some(val) = lookup("FORGE_QUALITY_THRESHOLD") {
            config.quality_threshold = parse_env_value(&val, "FORGE_QUALITY_THRESHOLD")?;
        }

        if let Some(val) = lookup("FORGE_DOMAIN_TERMS") {
            config.extra_domain_terms = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(val) = lookup("FORGE_GENERATION_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "FORGE_GENERATION_TIMEOUT_SECS")?;
            config.generation_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("FORGE_ENRICHMENT_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "FORGE_ENRICHMENT_TIMEOUT_SECS")?;
            config.enrichment_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("FORGE_MODEL") {
            config.model = val;
        }

        if let Some(val) = lookup("FORGE_TEMPERATURE") {
            config.temperature = parse_env_value(&val, "FORGE_TEMPERATURE")?;
        }

        if let Some(val) = lookup("FORGE_MAX_TOKENS") {
            config.max_tokens = parse_env_value(&val, "FORGE_MAX_TOKENS")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses a YAML document, overlaying its keys onto `self`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Yaml` for malformed YAML or unknown keys, and
    /// `ConfigError::ValidationFailed` if the merged values are invalid.
    pub fn merge_yaml(mut self, yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as unit, not as an empty mapping.
        if !yaml.trim().is_empty() {
            let file: ConfigFile = serde_yaml::from_str(yaml)?;
            file.apply(&mut self);
        }
        self.validate()?;
        Ok(self)
    }

    /// Loads a YAML configuration file on top of `self`.
    pub fn merge_yaml_file(self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        self.merge_yaml(&yaml)
    }

    /// Loads a YAML configuration file on top of the defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::default().merge_yaml_file(path)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_target_count == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_target_count must be greater than 0".to_string(),
            ));
        }

        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(ConfigError::ValidationFailed(format!(
                "batch_size must be between {} and {}",
                MIN_BATCH_SIZE, MAX_BATCH_SIZE
            )));
        }

        if self.max_attempts_per_batch == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_attempts_per_batch must be greater than 0".to_string(),
            ));
        }

        if self.max_batches == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_batches must be greater than 0".to_string(),
            ));
        }

        if self.max_consecutive_empty_batches == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_consecutive_empty_batches must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(ConfigError::ValidationFailed(
                "quality_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.generation_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "generation_timeout must be greater than 0".to_string(),
            ));
        }

        if self.enrichment_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "enrichment_timeout must be greater than 0".to_string(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model cannot be empty".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the largest allowed target count.
    pub fn with_max_target_count(mut self, max: usize) -> Self {
        self.max_target_count = max;
        self
    }

    /// Builder method to set the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Builder method to set attempts per batch.
    pub fn with_max_attempts_per_batch(mut self, attempts: u32) -> Self {
        self.max_attempts_per_batch = attempts;
        self
    }

    /// Builder method to set the batch ceiling.
    pub fn with_max_batches(mut self, max: u32) -> Self {
        self.max_batches = max;
        self
    }

    /// Builder method to set the consecutive empty-batch ceiling.
    pub fn with_max_consecutive_empty_batches(mut self, max: u32) -> Self {
        self.max_consecutive_empty_batches = max;
        self
    }

    /// Builder method to set the base retry backoff.
    pub fn with_base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    /// Builder method to set the avoid-list length.
    pub fn with_avoid_list_size(mut self, size: usize) -> Self {
        self.avoid_list_size = size;
        self
    }

    /// Builder method to set the quality threshold.
    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    /// Builder method to add domain vocabulary.
    pub fn with_extra_domain_terms(mut self, terms: Vec<String>) -> Self {
        self.extra_domain_terms = terms;
        self
    }

    /// Builder method to set the per-attempt generation timeout.
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// Builder method to set the enrichment timeout.
    pub fn with_enrichment_timeout(mut self, timeout: Duration) -> Self {
        self.enrichment_timeout = timeout;
        self
    }

    /// Builder method to set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Builder method to set temperature.
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    /// Builder method to set the completion token budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

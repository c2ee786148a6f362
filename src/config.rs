use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the enrichment pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Qdrant instance holding the documents.
    pub qdrant_url: String,
    /// Name of the Qdrant collection scanned by the pipeline.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Inference backend used by LLM-driven enrichment tasks.
    pub inference_provider: InferenceProvider,
    /// Model identifier passed to the inference provider.
    pub inference_model: String,
    /// Optional base URL override for the inference provider.
    pub inference_base_url: Option<String>,
    /// API key presented to hosted inference providers.
    pub inference_api_key: Option<String>,
    /// Per-request timeout applied to inference calls.
    pub inference_timeout: Duration,
    /// JSON file listing research topics for the categorization task.
    pub category_topics_path: Option<PathBuf>,
    /// Retry, batching, and scan settings for the pipeline engine.
    pub pipeline: PipelineSettings,
}

/// Supported inference backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InferenceProvider {
    /// Local Ollama runtime.
    Ollama,
    /// OpenAI or any OpenAI-compatible chat completions endpoint.
    OpenAI,
}

impl FromStr for InferenceProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

/// Tunables for the retry scheduler, batch writer, and work source.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Maximum number of invocation attempts per document.
    pub max_retries: u32,
    /// Base delay multiplied by the backoff factor.
    pub base_delay: Duration,
    /// Upper bound applied to the computed backoff (before jitter).
    pub max_delay: Duration,
    /// Backoff growth factor for transient faults.
    pub transient_factor: f64,
    /// Backoff growth factor for provider throttling.
    pub rate_limit_factor: f64,
    /// Upper bound (exclusive) of the uniform jitter added to each delay.
    pub max_jitter: Duration,
    /// Number of buffered results that triggers a bulk write.
    pub batch_flush_size: usize,
    /// Page size requested from the work source.
    pub scan_batch_size: usize,
    /// Age after which an open scan is considered expired.
    pub max_scan_duration: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay: Duration::from_secs(7),
            max_delay: Duration::from_secs(300),
            transient_factor: 1.5,
            rate_limit_factor: 2.0,
            max_jitter: Duration::from_secs(1),
            batch_flush_size: 50,
            scan_batch_size: 100,
            max_scan_duration: Duration::from_secs(1800),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as absent so that an empty `.env` entry falls back to the
    /// default rather than failing to parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required =
            |key: &str| optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()));

        let inference_provider = required("INFERENCE_PROVIDER")?
            .parse()
            .map_err(|()| ConfigError::InvalidValue("INFERENCE_PROVIDER".to_string()))?;
        let inference_api_key = optional("INFERENCE_API_KEY");
        if inference_provider == InferenceProvider::OpenAI && inference_api_key.is_none() {
            return Err(ConfigError::MissingVariable("INFERENCE_API_KEY".to_string()));
        }

        let defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            max_retries: parse_or(
                "ENRICH_MAX_RETRIES",
                optional("ENRICH_MAX_RETRIES"),
                defaults.max_retries,
            )?,
            base_delay: parse_secs(
                "ENRICH_BASE_DELAY_SECS",
                optional("ENRICH_BASE_DELAY_SECS"),
                defaults.base_delay,
            )?,
            max_delay: parse_secs(
                "ENRICH_MAX_DELAY_SECS",
                optional("ENRICH_MAX_DELAY_SECS"),
                defaults.max_delay,
            )?,
            transient_factor: parse_factor(
                "ENRICH_TRANSIENT_FACTOR",
                optional("ENRICH_TRANSIENT_FACTOR"),
                defaults.transient_factor,
            )?,
            rate_limit_factor: parse_factor(
                "ENRICH_RATE_LIMIT_FACTOR",
                optional("ENRICH_RATE_LIMIT_FACTOR"),
                defaults.rate_limit_factor,
            )?,
            max_jitter: optional("ENRICH_MAX_JITTER_MS")
                .map(|value| {
                    value
                        .trim()
                        .parse::<u64>()
                        .map(Duration::from_millis)
                        .map_err(|_| ConfigError::InvalidValue("ENRICH_MAX_JITTER_MS".into()))
                })
                .transpose()?
                .unwrap_or(defaults.max_jitter),
            batch_flush_size: parse_nonzero(
                "ENRICH_BATCH_FLUSH_SIZE",
                optional("ENRICH_BATCH_FLUSH_SIZE"),
                defaults.batch_flush_size,
            )?,
            scan_batch_size: parse_nonzero(
                "ENRICH_SCAN_BATCH_SIZE",
                optional("ENRICH_SCAN_BATCH_SIZE"),
                defaults.scan_batch_size,
            )?,
            max_scan_duration: parse_secs(
                "ENRICH_MAX_SCAN_DURATION_SECS",
                optional("ENRICH_MAX_SCAN_DURATION_SECS"),
                defaults.max_scan_duration,
            )?,
        };

        Ok(Self {
            qdrant_url: required("QDRANT_URL")?,
            qdrant_collection_name: required("QDRANT_COLLECTION_NAME")?,
            qdrant_api_key: optional("QDRANT_API_KEY"),
            inference_provider,
            inference_model: required("INFERENCE_MODEL")?,
            inference_base_url: optional("INFERENCE_BASE_URL"),
            inference_api_key,
            inference_timeout: parse_secs(
                "INFERENCE_TIMEOUT_SECS",
                optional("INFERENCE_TIMEOUT_SECS"),
                Duration::from_secs(120),
            )?,
            category_topics_path: optional("CATEGORY_TOPICS_PATH").map(PathBuf::from),
            pipeline,
        })
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn parse_nonzero(key: &str, value: Option<String>, default: usize) -> Result<usize, ConfigError> {
    let parsed = parse_or(key, value, default)?;
    if parsed == 0 {
        return Err(ConfigError::InvalidValue(key.to_string()));
    }
    Ok(parsed)
}

fn parse_secs(
    key: &str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    let seconds: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))?;
    Duration::try_from_secs_f64(seconds).map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn parse_factor(key: &str, value: Option<String>, default: f64) -> Result<f64, ConfigError> {
    let factor = parse_or(key, value, default)?;
    if !factor.is_finite() || factor <= 0.0 {
        return Err(ConfigError::InvalidValue(key.to_string()));
    }
    Ok(factor)
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        inference_provider = ?config.inference_provider,
        inference_model = %config.inference_model,
        max_retries = config.pipeline.max_retries,
        batch_flush_size = config.pipeline.batch_flush_size,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn base_pairs() -> Vec<(&'static str, &'static str)> {
        vec![
            ("QDRANT_URL", "http://127.0.0.1:6333"),
            ("QDRANT_COLLECTION_NAME", "articles"),
            ("INFERENCE_PROVIDER", "ollama"),
            ("INFERENCE_MODEL", "llama3"),
        ]
    }

    #[test]
    fn defaults_apply_when_pipeline_variables_are_absent() {
        let config = Config::from_lookup(lookup_from(&base_pairs())).expect("config");
        assert_eq!(config.pipeline, PipelineSettings::default());
        assert_eq!(config.inference_provider, InferenceProvider::Ollama);
        assert_eq!(config.inference_timeout, Duration::from_secs(120));
        assert!(config.category_topics_path.is_none());
    }

    #[test]
    fn pipeline_overrides_are_parsed() {
        let mut pairs = base_pairs();
        pairs.extend([
            ("ENRICH_MAX_RETRIES", "4"),
            ("ENRICH_BASE_DELAY_SECS", "0.5"),
            ("ENRICH_RATE_LIMIT_FACTOR", "3"),
            ("ENRICH_BATCH_FLUSH_SIZE", "25"),
            ("ENRICH_MAX_JITTER_MS", "0"),
            ("ENRICH_SCAN_BATCH_SIZE", " "),
        ]);
        let config = Config::from_lookup(lookup_from(&pairs)).expect("config");
        assert_eq!(config.pipeline.max_retries, 4);
        assert_eq!(config.pipeline.base_delay, Duration::from_millis(500));
        assert_eq!(config.pipeline.rate_limit_factor, 3.0);
        assert_eq!(config.pipeline.batch_flush_size, 25);
        assert_eq!(config.pipeline.max_jitter, Duration::ZERO);
        assert_eq!(config.pipeline.scan_batch_size, 100);
    }

    #[test]
    fn zero_flush_size_is_rejected() {
        let mut pairs = base_pairs();
        pairs.push(("ENRICH_BATCH_FLUSH_SIZE", "0"));
        let error = Config::from_lookup(lookup_from(&pairs)).expect_err("invalid");
        assert!(matches!(
            error,
            ConfigError::InvalidValue(key) if key == "ENRICH_BATCH_FLUSH_SIZE"
        ));
    }

    #[test]
    fn negative_factor_is_rejected() {
        let mut pairs = base_pairs();
        pairs.push(("ENRICH_TRANSIENT_FACTOR", "-1"));
        assert!(Config::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn openai_requires_api_key() {
        let mut pairs = base_pairs();
        pairs.retain(|(key, _)| *key != "INFERENCE_PROVIDER");
        pairs.push(("INFERENCE_PROVIDER", "OpenAI"));
        let error = Config::from_lookup(lookup_from(&pairs)).expect_err("missing key");
        assert!(matches!(error, ConfigError::MissingVariable(key) if key == "INFERENCE_API_KEY"));

        pairs.push(("INFERENCE_API_KEY", "sk-test"));
        let config = Config::from_lookup(lookup_from(&pairs)).expect("config");
        assert_eq!(config.inference_provider, InferenceProvider::OpenAI);
    }

    #[test]
    fn missing_required_variable_is_reported() {
        let pairs: Vec<_> = base_pairs()
            .into_iter()
            .filter(|(key, _)| *key != "QDRANT_URL")
            .collect();
        let error = Config::from_lookup(lookup_from(&pairs)).expect_err("missing url");
        assert!(matches!(error, ConfigError::MissingVariable(key) if key == "QDRANT_URL"));
    }
}

//! Configuration handling.
//!
//! Two layers live here: the serializable handler/pipeline model in
//! [`handlers`], and the runtime [`Settings`] read from environment variables
//! with development defaults.

pub mod handlers;

pub use handlers::{
    DEFAULT_MAX_READ_SIZE, DEFAULT_SCRIPT_ENGINE, DomTaggerConfig, ExtractionRuleConfig,
    HandlerConfig, LanguageTaggerConfig, PipelineConfig, RestrictionConfig, ScriptConfig,
    dom_content_types,
};

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable names.
pub const ENV_CONCURRENCY: &str = "ENRICH_CONCURRENCY";
pub const ENV_DOCUMENT_TIMEOUT_MS: &str = "ENRICH_DOCUMENT_TIMEOUT_MS";
pub const ENV_PIPELINE: &str = "ENRICH_PIPELINE";

const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_DOCUMENT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_PIPELINE: &str = "pipeline.json";

/// Errors raised while building configuration. Always surfaced before any
/// document is processed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid pattern '{pattern}' for field '{field}': {source}")]
    InvalidPattern {
        field: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{handler}: '{field}' cannot be blank")]
    MissingValue {
        handler: &'static str,
        field: &'static str,
    },

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("unknown charset: {0}")]
    UnknownCharset(String),

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Runtime settings for a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    concurrency: usize,
    document_timeout: Option<Duration>,
    pipeline_path: PathBuf,
}

impl Settings {
    pub fn new(
        concurrency: usize,
        document_timeout: Option<Duration>,
        pipeline_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            concurrency,
            document_timeout,
            pipeline_path: pipeline_path.into(),
        }
    }

    /// Load from environment variables, falling back to development defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let concurrency = match env::var(ENV_CONCURRENCY) {
            Ok(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                field: ENV_CONCURRENCY,
                reason: format!("{e}"),
            })?,
            Err(_) => DEFAULT_CONCURRENCY,
        };
        if concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: ENV_CONCURRENCY,
                reason: "must be at least 1".to_string(),
            });
        }

        let timeout_ms: u64 = match env::var(ENV_DOCUMENT_TIMEOUT_MS) {
            Ok(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                field: ENV_DOCUMENT_TIMEOUT_MS,
                reason: format!("{e}"),
            })?,
            Err(_) => DEFAULT_DOCUMENT_TIMEOUT_MS,
        };
        // 0 disables the per-document timeout.
        let document_timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));

        let pipeline_path =
            env::var(ENV_PIPELINE).unwrap_or_else(|_| DEFAULT_PIPELINE.to_string());

        Ok(Self::new(concurrency, document_timeout, pipeline_path))
    }

    /// Maximum number of documents processed at once.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
    /// Budget for one document's whole pipeline run.
    pub fn document_timeout(&self) -> Option<Duration> {
        self.document_timeout
    }
    /// Location of the pipeline JSON definition.
    pub fn pipeline_path(&self) -> &Path {
        &self.pipeline_path
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(
            DEFAULT_CONCURRENCY,
            Some(Duration::from_millis(DEFAULT_DOCUMENT_TIMEOUT_MS)),
            DEFAULT_PIPELINE,
        )
    }
}

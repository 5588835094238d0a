//! Serializable handler configuration.
//!
//! Every handler can be rebuilt from the configuration it reports, so a
//! pipeline can be written out and read back without losing anything.

use serde::{Deserialize, Serialize};

use crate::doc::metadata::CONTENT_TYPE;

/// Default bound on how much content a handler materialises in memory.
pub const DEFAULT_MAX_READ_SIZE: usize = 1024 * 1024;
/// Scripting engine used when none is named.
pub const DEFAULT_SCRIPT_ENGINE: &str = "rhai";

const DOM_CONTENT_TYPES: &str = "text/html|application/xhtml\\+xml|application/vnd\\.wap\\.xhtml\\+xml\
|application/x-asp|application/xml|text/xml|application/atom\\+xml|application/rss\\+xml\
|application/mathml\\+xml|image/svg\\+xml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestrictionConfig {
    pub field: String,
    pub pattern: String,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl RestrictionConfig {
    pub fn new(field: impl Into<String>, pattern: impl Into<String>, case_sensitive: bool) -> Self {
        Self {
            field: field.into(),
            pattern: pattern.into(),
            case_sensitive,
        }
    }
}

/// Content types a DOM can be built from. Values may carry parameters such as
/// `; charset=utf-8`.
pub fn dom_content_types() -> Vec<RestrictionConfig> {
    vec![RestrictionConfig::new(
        CONTENT_TYPE,
        format!("(?:{DOM_CONTENT_TYPES})(?:\\s*;.*)?"),
        false,
    )]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRuleConfig {
    pub selector: String,
    pub to_field: String,
    #[serde(default)]
    pub overwrite: bool,
    /// `text`, `html` or `outerHtml`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomTaggerConfig {
    #[serde(default = "dom_content_types")]
    pub restrict_to: Vec<RestrictionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_charset: Option<String>,
    #[serde(default)]
    pub rules: Vec<ExtractionRuleConfig>,
}

impl Default for DomTaggerConfig {
    fn default() -> Self {
        Self {
            restrict_to: dom_content_types(),
            source_charset: None,
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageTaggerConfig {
    #[serde(default)]
    pub restrict_to: Vec<RestrictionConfig>,
    /// Candidate ISO 639-1 codes. Empty means any supported language.
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub keep_probabilities: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_language: Option<String>,
    /// Below this top probability the fallback language is used.
    #[serde(default)]
    pub min_confidence: f64,
    #[serde(default = "default_max_read_size")]
    pub max_read_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_charset: Option<String>,
}

impl Default for LanguageTaggerConfig {
    fn default() -> Self {
        Self {
            restrict_to: Vec::new(),
            languages: Vec::new(),
            keep_probabilities: false,
            fallback_language: None,
            min_confidence: 0.0,
            max_read_size: DEFAULT_MAX_READ_SIZE,
            source_charset: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptConfig {
    #[serde(default)]
    pub restrict_to: Vec<RestrictionConfig>,
    #[serde(default = "default_engine_name")]
    pub engine_name: String,
    pub script: String,
    #[serde(default = "default_max_read_size")]
    pub max_read_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_charset: Option<String>,
}

impl ScriptConfig {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            restrict_to: Vec::new(),
            engine_name: default_engine_name(),
            script: script.into(),
            max_read_size: DEFAULT_MAX_READ_SIZE,
            source_charset: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HandlerConfig {
    DomTagger(DomTaggerConfig),
    LanguageTagger(LanguageTaggerConfig),
    ScriptTagger(ScriptConfig),
    ScriptTransformer(ScriptConfig),
    ScriptFilter(ScriptConfig),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, super::ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String, super::ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn default_max_read_size() -> usize {
    DEFAULT_MAX_READ_SIZE
}

fn default_engine_name() -> String {
    DEFAULT_SCRIPT_ENGINE.to_string()
}

//! Handlers: taggers, filters and transformers run by the pipeline.

pub mod context;
pub mod dom;
pub mod errors;
pub mod language;
pub mod script;

pub use context::HandlerContext;
pub use dom::DomTagger;
pub use errors::HandlerError;
pub use language::LanguageTagger;
pub use script::{ScriptEngines, ScriptFilter, ScriptTagger, ScriptTransformer};

use bytes::Bytes;
use encoding_rs::Encoding;
use std::sync::Arc;

use crate::charset::encoding_for_label;
use crate::config::{ConfigError, HandlerConfig};
use crate::doc::Metadata;
use crate::restriction::Restrictions;

/// What the pipeline should do after a handler ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    /// Drop the document; remaining handlers do not run.
    Exclude,
    /// Continue with this content in place of the current one.
    Replace(Bytes),
}

/// Verdict of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Include,
    Exclude,
    NoOpinion,
}

impl From<FilterVerdict> for Outcome {
    fn from(verdict: FilterVerdict) -> Self {
        match verdict {
            FilterVerdict::Exclude => Outcome::Exclude,
            FilterVerdict::Include | FilterVerdict::NoOpinion => Outcome::Continue,
        }
    }
}

/// Common contract of every handler in a pipeline.
pub trait Handler: Send + Sync {
    /// Handler type, used when reporting failures.
    fn kind(&self) -> &'static str;

    fn restrictions(&self) -> &Restrictions;

    fn applies(&self, metadata: &Metadata) -> bool {
        self.restrictions().applies(metadata)
    }

    fn execute(&self, ctx: &mut HandlerContext<'_>) -> Result<Outcome, HandlerError>;

    /// Configuration this handler can be rebuilt from.
    fn config(&self) -> HandlerConfig;
}

/// Builds a handler from its configuration, validating it on the way.
pub fn build_handler(
    config: &HandlerConfig,
    engines: &Arc<ScriptEngines>,
) -> Result<Box<dyn Handler>, ConfigError> {
    Ok(match config {
        HandlerConfig::DomTagger(c) => Box::new(DomTagger::from_config(c)?),
        HandlerConfig::LanguageTagger(c) => Box::new(LanguageTagger::from_config(c)?),
        HandlerConfig::ScriptTagger(c) => Box::new(ScriptTagger::from_config(c, engines.clone())?),
        HandlerConfig::ScriptTransformer(c) => {
            Box::new(ScriptTransformer::from_config(c, engines.clone())?)
        }
        HandlerConfig::ScriptFilter(c) => Box::new(ScriptFilter::from_config(c, engines.clone())?),
    })
}

/// Resolves an optional `sourceCharset` label at configuration time.
pub(crate) fn source_encoding(
    label: Option<&str>,
) -> Result<Option<&'static Encoding>, ConfigError> {
    match label.map(str::trim).filter(|l| !l.is_empty()) {
        None => Ok(None),
        Some(label) => encoding_for_label(label)
            .map(Some)
            .ok_or_else(|| ConfigError::UnknownCharset(label.to_string())),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DomTaggerConfig, ExtractionRuleConfig, LanguageTaggerConfig, RestrictionConfig,
        ScriptConfig,
    };

    fn round_trip(config: HandlerConfig) {
        let engines = Arc::new(ScriptEngines::default());
        let handler = build_handler(&config, &engines).unwrap();
        let json = serde_json::to_string(&handler.config()).unwrap();
        let restored: HandlerConfig = serde_json::from_str(&json).unwrap();
        let rebuilt = build_handler(&restored, &engines).unwrap();

        assert_eq!(handler.config(), config);
        assert_eq!(rebuilt.config(), handler.config());
        assert_eq!(rebuilt.restrictions(), handler.restrictions());
    }

    #[test]
    fn test_dom_tagger_round_trip() {
        round_trip(HandlerConfig::DomTagger(DomTaggerConfig {
            restrict_to: vec![RestrictionConfig::new("document.contentType", "text/html", true)],
            source_charset: Some("ISO-8859-1".into()),
            rules: vec![
                ExtractionRuleConfig {
                    selector: "h1".into(),
                    to_field: "title".into(),
                    overwrite: true,
                    extract: Some("text".into()),
                },
                ExtractionRuleConfig {
                    selector: "div.body".into(),
                    to_field: "body".into(),
                    overwrite: false,
                    extract: Some("outerHtml".into()),
                },
            ],
        }));
    }

    #[test]
    fn test_language_tagger_round_trip() {
        round_trip(HandlerConfig::LanguageTagger(LanguageTaggerConfig {
            keep_probabilities: true,
            fallback_language: Some("fr".into()),
            ..Default::default()
        }));
        round_trip(HandlerConfig::LanguageTagger(LanguageTaggerConfig {
            languages: vec!["it".into(), "pt".into(), "en".into()],
            min_confidence: 0.3,
            max_read_size: 2048,
            ..Default::default()
        }));
    }

    #[test]
    fn test_script_handlers_round_trip() {
        let config = ScriptConfig {
            restrict_to: vec![RestrictionConfig::new("a", "b.*", false)],
            engine_name: "an engine name".into(),
            script: "a script".into(),
            max_read_size: 256,
            source_charset: None,
        };
        round_trip(HandlerConfig::ScriptTagger(config.clone()));
        round_trip(HandlerConfig::ScriptTransformer(config.clone()));
        round_trip(HandlerConfig::ScriptFilter(config));
    }

    #[test]
    fn test_unknown_source_charset_is_config_error() {
        let config = HandlerConfig::DomTagger(DomTaggerConfig {
            source_charset: Some("klingon-8".into()),
            ..Default::default()
        });
        let err = build_handler(&config, &Arc::new(ScriptEngines::default()))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::UnknownCharset(_)));
    }

    #[test]
    fn test_filter_verdicts() {
        assert_eq!(Outcome::from(FilterVerdict::Include), Outcome::Continue);
        assert_eq!(Outcome::from(FilterVerdict::NoOpinion), Outcome::Continue);
        assert_eq!(Outcome::from(FilterVerdict::Exclude), Outcome::Exclude);
    }
}

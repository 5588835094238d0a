//! Extracts element values from HTML/XML content into metadata fields.
//!
//! The content is parsed into a DOM once per document, however many rules
//! are configured. Rules run in declared order. A rule that selects nothing
//! (or only blank values) stops the remaining rules for that document.

pub mod parser;

pub use parser::{Dom, DomNode, DomParser, ScraperParser};

use encoding_rs::Encoding;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::config::{ConfigError, DomTaggerConfig, ExtractionRuleConfig, HandlerConfig};
use crate::doc::Metadata;
use crate::handler::{Handler, HandlerContext, HandlerError, Outcome, source_encoding};
use crate::merge;
use crate::restriction::Restrictions;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtractMode {
    #[default]
    Text,
    Html,
    OuterHtml,
}

impl ExtractMode {
    /// Case-insensitive. Unknown names fall back to `Text` with a warning.
    pub fn parse(value: Option<&str>) -> Self {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Self::Text;
        };
        match value.to_ascii_lowercase().as_str() {
            "text" => Self::Text,
            "html" => Self::Html,
            "outerhtml" => Self::OuterHtml,
            _ => {
                warn!(
                    "\"{}\" is not a supported extract type, \"text\" will be used \
                     (other options are \"html\" and \"outerHtml\")",
                    value
                );
                Self::Text
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Html => "html",
            Self::OuterHtml => "outerHtml",
        }
    }

    fn value_of(self, node: &dyn DomNode) -> String {
        match self {
            Self::Text => node.text(),
            Self::Html => node.html(),
            Self::OuterHtml => node.outer_html(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRule {
    pub selector: String,
    pub to_field: String,
    pub overwrite: bool,
    pub mode: ExtractMode,
}

impl ExtractionRule {
    fn from_config(config: &ExtractionRuleConfig) -> Result<Self, ConfigError> {
        if config.selector.trim().is_empty() {
            return Err(ConfigError::MissingValue {
                handler: "domTagger",
                field: "selector",
            });
        }
        if config.to_field.trim().is_empty() {
            return Err(ConfigError::MissingValue {
                handler: "domTagger",
                field: "toField",
            });
        }
        Ok(Self {
            selector: config.selector.clone(),
            to_field: config.to_field.clone(),
            overwrite: config.overwrite,
            mode: ExtractMode::parse(config.extract.as_deref()),
        })
    }

    fn to_config(&self) -> ExtractionRuleConfig {
        ExtractionRuleConfig {
            selector: self.selector.clone(),
            to_field: self.to_field.clone(),
            overwrite: self.overwrite,
            extract: Some(self.mode.as_str().to_string()),
        }
    }
}

pub struct DomTagger {
    restrictions: Restrictions,
    source_charset: Option<String>,
    encoding: Option<&'static Encoding>,
    rules: Vec<ExtractionRule>,
    parser: Arc<dyn DomParser>,
}

impl DomTagger {
    pub fn from_config(config: &DomTaggerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            restrictions: Restrictions::from_configs(&config.restrict_to)?,
            source_charset: config.source_charset.clone(),
            encoding: source_encoding(config.source_charset.as_deref())?,
            rules: config
                .rules
                .iter()
                .map(ExtractionRule::from_config)
                .collect::<Result<_, _>>()?,
            parser: Arc::new(ScraperParser),
        })
    }

    /// Swaps the DOM implementation.
    pub fn with_parser(mut self, parser: Arc<dyn DomParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn rules(&self) -> &[ExtractionRule] {
        &self.rules
    }

    fn apply_rules(&self, dom: &dyn Dom, metadata: &mut Metadata) {
        for rule in &self.rules {
            let nodes = dom.select(&rule.selector);
            if nodes.is_empty() {
                debug!("No element matches '{}', skipping remaining rules", rule.selector);
                return;
            }

            let values = merge::non_blank(nodes.iter().map(|node| rule.mode.value_of(node.as_ref())));
            if values.is_empty() {
                debug!("Only blank values for '{}', skipping remaining rules", rule.selector);
                return;
            }

            merge::merge_values(metadata, &rule.to_field, values, rule.overwrite);
        }
    }
}

impl Handler for DomTagger {
    fn kind(&self) -> &'static str {
        "domTagger"
    }

    fn restrictions(&self) -> &Restrictions {
        &self.restrictions
    }

    #[instrument(skip_all, fields(reference = %ctx.reference(), rules = self.rules.len()))]
    fn execute(&self, ctx: &mut HandlerContext<'_>) -> Result<Outcome, HandlerError> {
        let encoding = ctx.resolve_encoding(self.encoding)?;
        let bytes = ctx.content().read_all().map_err(|e| ctx.io_error(e))?;
        let (markup, _, _) = encoding.decode(&bytes);

        let dom = self.parser.parse(&markup, ctx.reference());
        self.apply_rules(dom.as_ref(), ctx.metadata_mut());
        Ok(Outcome::Continue)
    }

    fn config(&self) -> HandlerConfig {
        HandlerConfig::DomTagger(DomTaggerConfig {
            restrict_to: self.restrictions.to_configs(),
            source_charset: self.source_charset.clone(),
            rules: self.rules.iter().map(ExtractionRule::to_config).collect(),
        })
    }
}

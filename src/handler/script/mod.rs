//! Handlers running user scripts against a document's text and metadata.
//!
//! The script sees `content` and `metadata`; anything it changes through them
//! is applied to the document only when the script succeeds. How much content
//! is bound is bounded by `maxReadSize`, and a cancelled document stops the
//! script through its cancellation token.

pub mod engine;
pub mod rhai_engine;

pub use engine::{ScriptBindings, ScriptEngine, ScriptEngines, ScriptError, ScriptValue};
pub use rhai_engine::RhaiEngine;

use bytes::Bytes;
use encoding_rs::Encoding;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::charset::{TextChunks, decode_bounded};
use crate::config::{ConfigError, HandlerConfig, ScriptConfig};
use crate::doc::metadata::CONTENT_ENCODING;
use crate::handler::{
    FilterVerdict, Handler, HandlerContext, HandlerError, Outcome, source_encoding,
};
use crate::restriction::Restrictions;

/// Shared configuration and invocation logic of the script handlers.
struct ScriptRunner {
    restrictions: Restrictions,
    engine_name: String,
    script: String,
    max_read_size: usize,
    source_charset: Option<String>,
    encoding: Option<&'static Encoding>,
    engines: Arc<ScriptEngines>,
}

impl ScriptRunner {
    fn from_config(
        handler: &'static str,
        config: &ScriptConfig,
        engines: Arc<ScriptEngines>,
    ) -> Result<Self, ConfigError> {
        if config.script.trim().is_empty() {
            return Err(ConfigError::MissingValue {
                handler,
                field: "script",
            });
        }
        if config.engine_name.trim().is_empty() {
            return Err(ConfigError::MissingValue {
                handler,
                field: "engineName",
            });
        }
        if config.max_read_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "maxReadSize",
                reason: "must be positive".to_string(),
            });
        }
        Ok(Self {
            restrictions: Restrictions::from_configs(&config.restrict_to)?,
            engine_name: config.engine_name.clone(),
            script: config.script.clone(),
            max_read_size: config.max_read_size,
            source_charset: config.source_charset.clone(),
            encoding: source_encoding(config.source_charset.as_deref())?,
            engines,
        })
    }

    fn to_config(&self) -> ScriptConfig {
        ScriptConfig {
            restrict_to: self.restrictions.to_configs(),
            engine_name: self.engine_name.clone(),
            script: self.script.clone(),
            max_read_size: self.max_read_size,
            source_charset: self.source_charset.clone(),
        }
    }

    fn script_error(&self, ctx: &HandlerContext<'_>, message: impl Into<String>) -> HandlerError {
        HandlerError::Script {
            reference: ctx.reference().to_string(),
            engine: self.engine_name.clone(),
            message: message.into(),
        }
    }

    fn engine(&self, ctx: &HandlerContext<'_>) -> Result<Arc<dyn ScriptEngine>, HandlerError> {
        self.engines
            .get(&self.engine_name)
            .ok_or_else(|| self.script_error(ctx, "script engine not found"))
    }

    /// Text bound to the script, cut at `max_read_size` bytes.
    fn bounded_text(&self, ctx: &HandlerContext<'_>) -> Result<String, HandlerError> {
        let encoding = ctx.resolve_encoding(self.encoding)?;
        let reader = ctx.content().reader().map_err(|e| ctx.io_error(e))?;
        let (text, truncated) =
            decode_bounded(reader, encoding, self.max_read_size).map_err(|e| ctx.io_error(e))?;
        if truncated {
            debug!("Content truncated to {} bytes before binding", self.max_read_size);
        }
        Ok(text)
    }

    fn evaluate(
        &self,
        ctx: &HandlerContext<'_>,
        engine: &dyn ScriptEngine,
        bindings: &mut ScriptBindings,
    ) -> Result<ScriptValue, HandlerError> {
        ctx.check_cancelled()?;
        engine
            .evaluate(&self.script, bindings, ctx.cancel_token())
            .map_err(|e| match e {
                ScriptError::Cancelled => HandlerError::Timeout {
                    reference: ctx.reference().to_string(),
                },
                other => self.script_error(ctx, other.to_string()),
            })
    }

    /// Runs the script once over the bounded text and applies its metadata
    /// changes.
    fn run_once(&self, ctx: &mut HandlerContext<'_>) -> Result<ScriptValue, HandlerError> {
        let engine = self.engine(ctx)?;
        let text = self.bounded_text(ctx)?;
        let mut bindings = ScriptBindings::new(text, ctx.metadata().clone(), false);
        let value = self.evaluate(ctx, engine.as_ref(), &mut bindings)?;
        *ctx.metadata_mut() = bindings.metadata;
        Ok(value)
    }
}

/// Adds or modifies metadata through a script.
pub struct ScriptTagger {
    runner: ScriptRunner,
}

impl ScriptTagger {
    pub fn from_config(config: &ScriptConfig, engines: Arc<ScriptEngines>) -> Result<Self, ConfigError> {
        Ok(Self {
            runner: ScriptRunner::from_config("scriptTagger", config, engines)?,
        })
    }
}

impl Handler for ScriptTagger {
    fn kind(&self) -> &'static str {
        "scriptTagger"
    }

    fn restrictions(&self) -> &Restrictions {
        &self.runner.restrictions
    }

    #[instrument(skip_all, fields(reference = %ctx.reference(), engine = %self.runner.engine_name))]
    fn execute(&self, ctx: &mut HandlerContext<'_>) -> Result<Outcome, HandlerError> {
        self.runner.run_once(ctx)?;
        Ok(Outcome::Continue)
    }

    fn config(&self) -> HandlerConfig {
        HandlerConfig::ScriptTagger(self.runner.to_config())
    }
}

/// Accepts or rejects documents through a script: `true` includes, `false`
/// excludes, any other result expresses no opinion.
pub struct ScriptFilter {
    runner: ScriptRunner,
}

impl ScriptFilter {
    pub fn from_config(config: &ScriptConfig, engines: Arc<ScriptEngines>) -> Result<Self, ConfigError> {
        Ok(Self {
            runner: ScriptRunner::from_config("scriptFilter", config, engines)?,
        })
    }
}

impl Handler for ScriptFilter {
    fn kind(&self) -> &'static str {
        "scriptFilter"
    }

    fn restrictions(&self) -> &Restrictions {
        &self.runner.restrictions
    }

    #[instrument(skip_all, fields(reference = %ctx.reference(), engine = %self.runner.engine_name))]
    fn execute(&self, ctx: &mut HandlerContext<'_>) -> Result<Outcome, HandlerError> {
        let verdict = match self.runner.run_once(ctx)? {
            ScriptValue::Bool(true) => FilterVerdict::Include,
            ScriptValue::Bool(false) => FilterVerdict::Exclude,
            _ => FilterVerdict::NoOpinion,
        };
        if verdict == FilterVerdict::Exclude {
            info!("Document {} excluded by script filter", ctx.reference());
        }
        Ok(verdict.into())
    }

    fn config(&self) -> HandlerConfig {
        HandlerConfig::ScriptFilter(self.runner.to_config())
    }
}

/// Rewrites content through a script.
///
/// The content is fed to the script in successive chunks of at most
/// `maxReadSize` bytes; whatever each invocation leaves in `content` is
/// concatenated into the replacement content (UTF-8).
pub struct ScriptTransformer {
    runner: ScriptRunner,
}

impl ScriptTransformer {
    pub fn from_config(config: &ScriptConfig, engines: Arc<ScriptEngines>) -> Result<Self, ConfigError> {
        Ok(Self {
            runner: ScriptRunner::from_config("scriptTransformer", config, engines)?,
        })
    }
}

impl Handler for ScriptTransformer {
    fn kind(&self) -> &'static str {
        "scriptTransformer"
    }

    fn restrictions(&self) -> &Restrictions {
        &self.runner.restrictions
    }

    #[instrument(skip_all, fields(reference = %ctx.reference(), engine = %self.runner.engine_name))]
    fn execute(&self, ctx: &mut HandlerContext<'_>) -> Result<Outcome, HandlerError> {
        let engine = self.runner.engine(ctx)?;
        let encoding = ctx.resolve_encoding(self.runner.encoding)?;

        let mut metadata = ctx.metadata().clone();
        let mut output = String::new();
        let reader = ctx.content().reader().map_err(|e| ctx.io_error(e))?;
        for chunk in TextChunks::new(reader, encoding, self.runner.max_read_size) {
            let chunk = chunk.map_err(|e| ctx.io_error(e))?;
            let mut bindings = ScriptBindings::new(chunk, std::mem::take(&mut metadata), true);
            self.runner.evaluate(ctx, engine.as_ref(), &mut bindings)?;
            output.push_str(&bindings.content);
            metadata = bindings.metadata;
        }

        if !ctx.phase().is_parsed() {
            metadata.set(CONTENT_ENCODING, ["UTF-8"]);
        }
        *ctx.metadata_mut() = metadata;
        Ok(Outcome::Replace(Bytes::from(output)))
    }

    fn config(&self) -> HandlerConfig {
        HandlerConfig::ScriptTransformer(self.runner.to_config())
    }
}

//! Ordered, restriction-gated execution of handlers over one document.

pub mod runner;

pub use runner::{BatchRunner, DocumentReport, RunnerConfig};

use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::charset::{CharsetDetector, SniffingCharsetDetector};
use crate::config::{ConfigError, PipelineConfig};
use crate::doc::{Document, Phase};
use crate::handler::{Handler, HandlerContext, HandlerError, Outcome, ScriptEngines, build_handler};

/// Terminal state of a document that went through the pipeline without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every applicable handler ran.
    Accepted,
    /// A filter dropped the document; later handlers did not run.
    Rejected {
        handler_index: usize,
        handler_kind: &'static str,
    },
}

impl PipelineOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PipelineOutcome::Accepted)
    }
}

/// A handler failure, tagged with the document and the handler that raised it.
#[derive(Error, Debug)]
#[error("{reference}: handler #{handler_index} ({handler_kind}) failed: {source}")]
pub struct PipelineError {
    pub reference: String,
    pub handler_index: usize,
    pub handler_kind: &'static str,
    #[source]
    pub source: HandlerError,
}

impl PipelineError {
    pub fn is_timeout(&self) -> bool {
        self.source.is_timeout()
    }
}

pub struct Pipeline {
    handlers: Vec<Box<dyn Handler>>,
    charset_detector: Arc<dyn CharsetDetector>,
}

impl Pipeline {
    pub fn new(handlers: Vec<Box<dyn Handler>>) -> Self {
        Self {
            handlers,
            charset_detector: Arc::new(SniffingCharsetDetector),
        }
    }

    /// Builds every handler of `config`, failing on the first invalid one.
    pub fn from_config(
        config: &PipelineConfig,
        engines: Arc<ScriptEngines>,
    ) -> Result<Self, ConfigError> {
        let handlers = config
            .handlers
            .iter()
            .map(|c| build_handler(c, &engines))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(handlers))
    }

    pub fn with_charset_detector(mut self, detector: Arc<dyn CharsetDetector>) -> Self {
        self.charset_detector = detector;
        self
    }

    pub fn handlers(&self) -> &[Box<dyn Handler>] {
        &self.handlers
    }

    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            handlers: self.handlers.iter().map(|h| h.config()).collect(),
        }
    }

    /// Runs the handlers in declared order. Each handler's restrictions are
    /// checked against the metadata as left by the handlers before it.
    #[instrument(skip_all, fields(reference = %doc.reference(), phase = ?phase))]
    pub fn process(
        &self,
        doc: &mut Document,
        phase: Phase,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        for (index, handler) in self.handlers.iter().enumerate() {
            let fail = |reference: &str, source: HandlerError| PipelineError {
                reference: reference.to_string(),
                handler_index: index,
                handler_kind: handler.kind(),
                source,
            };

            if cancel.is_cancelled() {
                let source = HandlerError::Timeout {
                    reference: doc.reference().to_string(),
                };
                return Err(fail(doc.reference(), source));
            }

            if !handler.applies(doc.metadata()) {
                debug!("Skipping handler #{} ({}): restrictions not met", index, handler.kind());
                continue;
            }

            let outcome = {
                let (reference, content, metadata) = doc.parts_mut();
                let mut ctx = HandlerContext::new(
                    reference,
                    content,
                    metadata,
                    phase,
                    cancel,
                    self.charset_detector.as_ref(),
                );
                handler.execute(&mut ctx)
            };

            match outcome.map_err(|e| fail(doc.reference(), e))? {
                Outcome::Continue => {}
                Outcome::Exclude => {
                    info!("Document {} rejected by handler #{} ({})", doc.reference(), index, handler.kind());
                    return Ok(PipelineOutcome::Rejected {
                        handler_index: index,
                        handler_kind: handler.kind(),
                    });
                }
                Outcome::Replace(content) => replace_content(doc, content),
            }
        }
        Ok(PipelineOutcome::Accepted)
    }
}

fn replace_content(doc: &mut Document, content: Bytes) {
    debug!("Content of {} replaced ({} bytes)", doc.reference(), content.len());
    doc.set_content(content);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HandlerConfig, RestrictionConfig, ScriptConfig};
    use crate::doc::Metadata;
    use crate::doc::metadata::CONTENT_TYPE;
    use crate::restriction::{Restriction, Restrictions};
    use std::sync::Mutex;

    /// Appends its name to `trail` and returns a fixed outcome.
    struct Recorder {
        name: &'static str,
        restrictions: Restrictions,
        outcome: Outcome,
        trail: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Recorder {
        fn new(name: &'static str, outcome: Outcome, trail: &Arc<Mutex<Vec<&'static str>>>) -> Self {
            Self {
                name,
                restrictions: Restrictions::default(),
                outcome,
                trail: trail.clone(),
            }
        }

        fn restricted(mut self, field: &str, pattern: &str) -> Self {
            self.restrictions = Restrictions::new(vec![Restriction::new(field, pattern, false).unwrap()]);
            self
        }
    }

    impl Handler for Recorder {
        fn kind(&self) -> &'static str {
            self.name
        }

        fn restrictions(&self) -> &Restrictions {
            &self.restrictions
        }

        fn execute(&self, ctx: &mut HandlerContext<'_>) -> Result<Outcome, HandlerError> {
            self.trail.lock().unwrap().push(self.name);
            ctx.metadata_mut().add("seen", [self.name]);
            Ok(self.outcome.clone())
        }

        fn config(&self) -> HandlerConfig {
            HandlerConfig::ScriptTagger(ScriptConfig::new(self.name))
        }
    }

    struct Failing;

    impl Handler for Failing {
        fn kind(&self) -> &'static str {
            "failing"
        }

        fn restrictions(&self) -> &Restrictions {
            static NONE: std::sync::LazyLock<Restrictions> = std::sync::LazyLock::new(Restrictions::default);
            &NONE
        }

        fn execute(&self, ctx: &mut HandlerContext<'_>) -> Result<Outcome, HandlerError> {
            Err(ctx.io_error(std::io::Error::other("disk on fire")))
        }

        fn config(&self) -> HandlerConfig {
            HandlerConfig::ScriptTagger(ScriptConfig::new("fail"))
        }
    }

    fn trail() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn process(pipeline: &Pipeline, doc: &mut Document) -> Result<PipelineOutcome, PipelineError> {
        pipeline.process(doc, Phase::PostParse, &CancellationToken::new())
    }

    #[test]
    fn test_handlers_run_in_declared_order() {
        let trail = trail();
        let pipeline = Pipeline::new(vec![
            Box::new(Recorder::new("first", Outcome::Continue, &trail)),
            Box::new(Recorder::new("second", Outcome::Continue, &trail)),
            Box::new(Recorder::new("third", Outcome::Continue, &trail)),
        ]);

        let mut doc = Document::new("doc", "text");
        assert_eq!(process(&pipeline, &mut doc).unwrap(), PipelineOutcome::Accepted);
        assert_eq!(*trail.lock().unwrap(), vec!["first", "second", "third"]);
        assert_eq!(doc.metadata().get("seen"), ["first", "second", "third"]);
    }

    #[test]
    fn test_restrictions_see_earlier_mutations() {
        let trail = trail();
        let pipeline = Pipeline::new(vec![
            Box::new(Recorder::new("gated", Outcome::Continue, &trail).restricted("seen", "opener")),
            Box::new(Recorder::new("opener", Outcome::Continue, &trail)),
            Box::new(Recorder::new("gated-late", Outcome::Continue, &trail).restricted("seen", "opener")),
        ]);

        let mut doc = Document::new("doc", "text");
        process(&pipeline, &mut doc).unwrap();
        assert_eq!(*trail.lock().unwrap(), vec!["opener", "gated-late"]);
    }

    #[test]
    fn test_exclude_stops_pipeline() {
        let trail = trail();
        let pipeline = Pipeline::new(vec![
            Box::new(Recorder::new("tagger", Outcome::Continue, &trail)),
            Box::new(Recorder::new("filter", Outcome::Exclude, &trail)),
            Box::new(Recorder::new("never", Outcome::Continue, &trail)),
        ]);

        let mut doc = Document::new("doc", "text");
        let outcome = process(&pipeline, &mut doc).unwrap();
        assert_eq!(
            outcome,
            PipelineOutcome::Rejected {
                handler_index: 1,
                handler_kind: "filter"
            }
        );
        assert!(!outcome.is_accepted());
        assert_eq!(*trail.lock().unwrap(), vec!["tagger", "filter"]);
    }

    #[test]
    fn test_error_identifies_document_and_handler() {
        let trail = trail();
        let pipeline = Pipeline::new(vec![
            Box::new(Recorder::new("before", Outcome::Continue, &trail)),
            Box::new(Failing),
            Box::new(Recorder::new("after", Outcome::Continue, &trail)),
        ]);

        let mut doc = Document::new("file:///tmp/a.txt", "text");
        let err = process(&pipeline, &mut doc).unwrap_err();
        assert_eq!(err.reference, "file:///tmp/a.txt");
        assert_eq!(err.handler_index, 1);
        assert_eq!(err.handler_kind, "failing");
        assert!(matches!(err.source, HandlerError::Io { .. }));
        assert!(err.to_string().contains("disk on fire"));
        assert_eq!(*trail.lock().unwrap(), vec!["before"]);
    }

    #[test]
    fn test_replaced_content_reaches_next_handler() {
        let engines = Arc::new(ScriptEngines::default());
        let config = PipelineConfig {
            handlers: vec![
                HandlerConfig::ScriptTransformer(ScriptConfig::new(r#"content.replace("cat", "dog");"#)),
                HandlerConfig::ScriptTagger(ScriptConfig::new(r#"metadata.setString("body", content);"#)),
            ],
        };
        let pipeline = Pipeline::from_config(&config, engines).unwrap();

        let mut doc = Document::new("doc", "the cat sat");
        process(&pipeline, &mut doc).unwrap();
        assert_eq!(doc.metadata().get("body"), ["the dog sat"]);
        assert_eq!(doc.content().read_all().unwrap(), b"the dog sat");
    }

    #[test]
    fn test_cancelled_document_times_out_before_next_handler() {
        let trail = trail();
        let pipeline = Pipeline::new(vec![Box::new(Recorder::new("tagger", Outcome::Continue, &trail))]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut doc = Document::new("doc", "text");
        let err = pipeline.process(&mut doc, Phase::PostParse, &cancel).unwrap_err();
        assert!(err.is_timeout());
        assert!(trail.lock().unwrap().is_empty());
    }

    #[test]
    fn test_config_round_trip() {
        let config = PipelineConfig {
            handlers: vec![
                HandlerConfig::ScriptFilter(ScriptConfig {
                    restrict_to: vec![RestrictionConfig::new(CONTENT_TYPE, "text/plain", false)],
                    ..ScriptConfig::new("true")
                }),
                HandlerConfig::LanguageTagger(Default::default()),
            ],
        };
        let pipeline = Pipeline::from_config(&config, Arc::new(ScriptEngines::default())).unwrap();
        let json = pipeline.config().to_json_string().unwrap();
        assert_eq!(PipelineConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_handler_fails_whole_pipeline() {
        let config = PipelineConfig {
            handlers: vec![HandlerConfig::ScriptTagger(ScriptConfig {
                restrict_to: vec![RestrictionConfig::new("a", "(", false)],
                ..ScriptConfig::new("true")
            })],
        };
        let err = Pipeline::from_config(&config, Arc::new(ScriptEngines::default())).err().unwrap();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_unmatched_restriction_skips_handler() {
        let trail = trail();
        let pipeline = Pipeline::new(vec![Box::new(
            Recorder::new("html-only", Outcome::Continue, &trail).restricted(CONTENT_TYPE, "text/html"),
        )]);

        let metadata: Metadata = [(CONTENT_TYPE, "application/pdf")].into_iter().collect();
        let mut doc = Document::with_metadata("doc", "%PDF", metadata);
        assert_eq!(process(&pipeline, &mut doc).unwrap(), PipelineOutcome::Accepted);
        assert!(trail.lock().unwrap().is_empty());
    }
}

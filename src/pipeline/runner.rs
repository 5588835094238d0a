use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::doc::{Document, Phase};
use crate::handler::HandlerError;
use crate::pipeline::{Pipeline, PipelineError, PipelineOutcome};

/// Batch runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub concurrency: usize,
    /// Budget for one document's whole pipeline run. `None` disables it.
    pub document_timeout: Option<Duration>,
    pub phase: Phase,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            document_timeout: Some(Duration::from_secs(30)),
            phase: Phase::PreParse,
        }
    }
}

impl From<&Settings> for RunnerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            concurrency: settings.concurrency(),
            document_timeout: settings.document_timeout(),
            ..Self::default()
        }
    }
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The worker running the document panicked or was torn down.
    #[error(transparent)]
    Worker(HandlerError),
}

impl DocumentError {
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Pipeline(e) => e.is_timeout(),
            Self::Worker(e) => e.is_timeout(),
        }
    }
}

/// What happened to one document of a batch.
#[derive(Debug)]
pub struct DocumentReport {
    pub reference: String,
    /// The document as the pipeline left it. `None` if its worker died.
    pub document: Option<Document>,
    pub result: Result<PipelineOutcome, DocumentError>,
}

impl DocumentReport {
    pub fn is_accepted(&self) -> bool {
        matches!(self.result, Ok(PipelineOutcome::Accepted))
    }
}

/// Runs many documents through one pipeline concurrently. A failing document
/// is reported and never aborts the rest of the batch.
pub struct BatchRunner {
    pipeline: Arc<Pipeline>,
    config: RunnerConfig,
    run_id: Uuid,
    shutdown_token: CancellationToken,
}

impl BatchRunner {
    pub fn new(pipeline: Pipeline, config: RunnerConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            config,
            run_id: Uuid::new_v4(),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Cancelling this token stops every document still in flight.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Processes `documents`, returning one report per document in input
    /// order.
    pub async fn run(&self, documents: Vec<Document>) -> Vec<DocumentReport> {
        info!(
            "Starting batch {} - documents: {}, concurrency: {}, timeout: {:?}",
            self.run_id,
            documents.len(),
            self.config.concurrency,
            self.config.document_timeout
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(documents.len());

        for doc in documents {
            let reference = doc.reference().to_string();
            let span = info_span!("document", reference = %reference, run_id = %self.run_id);
            let task = Self::process_document(
                self.pipeline.clone(),
                self.config.clone(),
                semaphore.clone(),
                self.shutdown_token.child_token(),
                doc,
            );
            handles.push((reference, tokio::spawn(task.instrument(span))));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (reference, handle) in handles {
            let report = match handle.await {
                Ok(report) => report,
                Err(e) => worker_failure(reference, e),
            };
            reports.push(report);
        }

        let accepted = reports.iter().filter(|r| r.is_accepted()).count();
        let failed = reports.iter().filter(|r| r.result.is_err()).count();
        info!(
            "Batch {} finished - accepted: {}, rejected: {}, failed: {}",
            self.run_id,
            accepted,
            reports.len() - accepted - failed,
            failed
        );
        reports
    }

    /// Process a single document
    async fn process_document(
        pipeline: Arc<Pipeline>,
        config: RunnerConfig,
        semaphore: Arc<Semaphore>,
        cancel: CancellationToken,
        mut doc: Document,
    ) -> DocumentReport {
        let reference = doc.reference().to_string();

        // Hold permit until the document completes
        let _permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                return DocumentReport {
                    result: Err(DocumentError::Worker(HandlerError::Internal {
                        reference: reference.clone(),
                        message: e.to_string(),
                    })),
                    reference,
                    document: Some(doc),
                };
            }
        };

        let token = cancel.clone();
        let phase = config.phase;
        let mut worker = tokio::task::spawn_blocking(move || {
            let result = pipeline.process(&mut doc, phase, &token);
            (doc, result)
        });

        let joined = match config.document_timeout {
            Some(timeout) => tokio::select! {
                joined = &mut worker => joined,
                _ = sleep(timeout) => {
                    warn!("Document {} exceeded {:?}, cancelling", reference, timeout);
                    cancel.cancel();
                    worker.await
                }
            },
            None => worker.await,
        };

        match joined {
            Ok((doc, result)) => {
                match &result {
                    Ok(PipelineOutcome::Accepted) => info!("Document {} processed", reference),
                    Ok(PipelineOutcome::Rejected { handler_kind, .. }) => {
                        info!("Document {} rejected by {}", reference, handler_kind)
                    }
                    Err(e) => error!("Document {} failed: {}", reference, e),
                }
                DocumentReport {
                    reference,
                    document: Some(doc),
                    result: result.map_err(DocumentError::from),
                }
            }
            Err(e) => worker_failure(reference, e),
        }
    }
}

fn worker_failure(reference: String, e: JoinError) -> DocumentReport {
    error!("Worker for document {} died: {}", reference, e);
    DocumentReport {
        result: Err(DocumentError::Worker(HandlerError::Internal {
            reference: reference.clone(),
            message: e.to_string(),
        })),
        reference,
        document: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, ScriptConfig};
    use crate::handler::ScriptEngines;

    fn pipeline(json: &str) -> Pipeline {
        let config = PipelineConfig::from_json_str(json).unwrap();
        Pipeline::from_config(&config, Arc::new(ScriptEngines::default())).unwrap()
    }

    #[test]
    fn test_config_from_settings() {
        let settings = Settings::new(7, None, "p.json");
        let config = RunnerConfig::from(&settings);
        assert_eq!(config.concurrency, 7);
        assert_eq!(config.document_timeout, None);
        assert_eq!(config.phase, Phase::PreParse);
    }

    #[tokio::test]
    async fn test_reports_follow_input_order() {
        let runner = BatchRunner::new(
            pipeline(r#"{"handlers":[{"type":"scriptTagger","script":"metadata.setString(\"len\", content.len().to_string());"}]}"#),
            RunnerConfig {
                concurrency: 2,
                ..RunnerConfig::default()
            },
        );

        let docs = (0..6)
            .map(|i| Document::new(format!("doc-{i}"), "x".repeat(i)))
            .collect();
        let reports = runner.run(docs).await;

        let references: Vec<_> = reports.iter().map(|r| r.reference.as_str()).collect();
        assert_eq!(references, ["doc-0", "doc-1", "doc-2", "doc-3", "doc-4", "doc-5"]);
        for (i, report) in reports.iter().enumerate() {
            let doc = report.document.as_ref().unwrap();
            assert_eq!(doc.metadata().get("len"), [i.to_string()]);
        }
    }

    #[tokio::test]
    async fn test_shutdown_cancels_documents() {
        let config = PipelineConfig {
            handlers: vec![crate::config::HandlerConfig::ScriptTagger(ScriptConfig::new("loop { }"))],
        };
        let runner = BatchRunner::new(
            Pipeline::from_config(&config, Arc::new(ScriptEngines::default())).unwrap(),
            RunnerConfig {
                document_timeout: None,
                ..RunnerConfig::default()
            },
        );

        let shutdown = runner.shutdown_token();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            shutdown.cancel();
        });

        let reports = runner.run(vec![Document::new("spinning", "text")]).await;
        let err = reports[0].result.as_ref().unwrap_err();
        assert!(err.is_timeout());
    }
}

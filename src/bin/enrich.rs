use anyhow::{Context, Result};
use enricher::{
    Document, Metadata, Pipeline, PipelineOutcome,
    config::{PipelineConfig, Settings},
    doc::metadata::CONTENT_TYPE,
    handler::ScriptEngines,
    pipeline::{BatchRunner, RunnerConfig},
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let settings = Settings::from_env()?;
    let raw = std::fs::read_to_string(settings.pipeline_path()).with_context(|| {
        format!("cannot read pipeline definition {}", settings.pipeline_path().display())
    })?;
    let config = PipelineConfig::from_json_str(&raw)?;
    let pipeline = Pipeline::from_config(&config, Arc::new(ScriptEngines::default()))?;
    info!(
        "Loaded pipeline with {} handlers from {}",
        pipeline.handlers().len(),
        settings.pipeline_path().display()
    );

    let documents: Vec<Document> = std::env::args_os()
        .skip(1)
        .map(PathBuf::from)
        .map(document_for_path)
        .collect();
    if documents.is_empty() {
        anyhow::bail!("usage: enrich <file>...");
    }

    let runner = BatchRunner::new(pipeline, RunnerConfig::from(&settings));

    // Spawn shutdown handler
    let shutdown_token = runner.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Received shutdown signal, cancelling in-flight documents...");
        shutdown_token.cancel();
    });

    let reports = runner.run(documents).await;
    let mut failed = 0;
    for report in &reports {
        let line = match &report.result {
            Ok(PipelineOutcome::Accepted) => json!({
                "reference": report.reference,
                "status": "accepted",
                "metadata": report.document.as_ref().map(Document::metadata),
            }),
            Ok(PipelineOutcome::Rejected { handler_index, handler_kind }) => json!({
                "reference": report.reference,
                "status": "rejected",
                "handler": { "index": handler_index, "kind": handler_kind },
            }),
            Err(e) => {
                failed += 1;
                json!({
                    "reference": report.reference,
                    "status": "failed",
                    "error": e.to_string(),
                })
            }
        };
        println!("{line}");
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} documents failed", reports.len());
    }
    Ok(())
}

fn document_for_path(path: PathBuf) -> Document {
    let mut metadata = Metadata::new();
    if let Some(content_type) = content_type_for(&path) {
        metadata.set(CONTENT_TYPE, [content_type]);
    }
    Document::with_metadata(path.display().to_string(), path, metadata)
}

fn content_type_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match extension.as_str() {
        "html" | "htm" => "text/html",
        "xhtml" => "application/xhtml+xml",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        _ => return None,
    })
}

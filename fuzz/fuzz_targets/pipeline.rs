#![no_main]

use libfuzzer_sys::fuzz_target;
use std::sync::{Arc, LazyLock};
use tokio_util::sync::CancellationToken;

use enricher::{
    Document, Metadata, Phase, Pipeline,
    config::PipelineConfig,
    doc::metadata::CONTENT_TYPE,
    handler::ScriptEngines,
};

static PIPELINE: LazyLock<Pipeline> = LazyLock::new(|| {
    let config = PipelineConfig::from_json_str(
        r#"{"handlers":[
            {"type":"domTagger","rules":[
                {"selector":"title","toField":"title"},
                {"selector":"p","toField":"body","extract":"outerHtml"}
            ]},
            {"type":"languageTagger","keepProbabilities":true,"maxReadSize":4096}
        ]}"#,
    )
    .unwrap();
    Pipeline::from_config(&config, Arc::new(ScriptEngines::default())).unwrap()
});

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes in any encoding must never panic the handlers
    let metadata: Metadata = [(CONTENT_TYPE, "text/html")].into_iter().collect();
    let mut doc = Document::with_metadata("fuzz", data.to_vec(), metadata);
    let _ = PIPELINE.process(&mut doc, Phase::PreParse, &CancellationToken::new());
});

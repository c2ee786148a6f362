use std::{env, sync::Once};

use rusty_enrich::{
    config,
    enrichment::{self, EnrichmentTask},
    inference::{self, CompletionRequest},
    pipeline::Pipeline,
    store::QdrantStore,
};
use std::sync::Arc;

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_config_once() -> &'static config::Config {
    INIT.call_once(|| {
        set_default_env("QDRANT_URL", "http://127.0.0.1:6333");
        set_default_env("QDRANT_COLLECTION_NAME", "news-articles");
        set_default_env("INFERENCE_PROVIDER", "ollama");
        set_default_env("INFERENCE_MODEL", "llama3.1");
        config::init_config().expect("live configuration");
    });
    config::get_config()
}

#[tokio::test]
#[ignore = "Requires live Qdrant"]
async fn live_qdrant_counts_eligible_documents() {
    let config = init_config_once();
    let store = QdrantStore::from_config(config, None).expect("store");
    let client = inference::build_inference_client(config).expect("client");
    let enricher =
        enrichment::build_enricher(EnrichmentTask::Country, config, client).expect("enricher");

    let pipeline = Pipeline::new(Arc::new(store), enricher, config.pipeline.clone());
    pipeline
        .count_eligible()
        .await
        .expect("Qdrant should answer count requests");
}

#[tokio::test]
#[ignore = "Requires live inference provider"]
async fn live_inference_completion() {
    let config = init_config_once();
    let client = inference::build_inference_client(config).expect("client");
    let text = client
        .complete(CompletionRequest {
            model: config.inference_model.clone(),
            prompt: "Reply with the single word: ready".into(),
            temperature: 0.0,
        })
        .await
        .expect("failed to request completion from provider");
    assert!(!text.trim().is_empty(), "expected non-empty completion");
}

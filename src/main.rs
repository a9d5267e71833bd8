use std::sync::Arc;

use anyhow::Result;
use livedoc_core::bridge;
use livedoc_core::orchestrator::{
    DirectoryPromptStore, EngineConfig, GeminiClient, GeminiConfig, InferenceService, LiveEngine,
    PromptStore, StaticPromptStore,
};
use livedoc_core::telemetry::init_tracing;
use tokio::io::BufReader;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_tracing()?;

    let config = EngineConfig::from_env();
    let inference: Option<Arc<dyn InferenceService>> = GeminiConfig::from_env()
        .map(|gemini| Arc::new(GeminiClient::new(gemini)) as Arc<dyn InferenceService>);
    let prompts: Arc<dyn PromptStore> = match std::env::var_os("LIVEDOC_PROMPT_DIR") {
        Some(dir) => Arc::new(DirectoryPromptStore::new(dir)),
        None => Arc::new(StaticPromptStore::default()),
    };

    info!(
        target: "livedoc",
        inference = inference.is_some(),
        idle_timeout_secs = config.idle_timeout.as_secs(),
        "starting live document engine"
    );

    let (engine, updates) = LiveEngine::new(config, inference, prompts);
    let reaper = engine.spawn_reaper(engine.config().reaper_period);

    let stdin = BufReader::new(tokio::io::stdin());
    bridge::run(engine, updates, stdin, tokio::io::stdout()).await?;

    reaper.abort();
    info!(target: "livedoc", "input closed; shutting down");
    Ok(())
}

use std::sync::Arc;

use webpilot_llm::{OpenAiGenerator, PlanGenerator};
use webpilot_server::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Webpilot server");

    let config = ServerConfig::from_env();

    // A missing credential degrades the service instead of refusing to
    // start: ANALYZE/EXECUTE requests answer "service unavailable".
    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    let model = std::env::var("OPENAI_MODEL").ok();
    let generator: Option<Arc<dyn PlanGenerator>> =
        match OpenAiGenerator::new(&api_key, model.as_deref()) {
            Ok(gen) => {
                tracing::info!(model = gen.model(), "Plan generator ready");
                Some(Arc::new(gen))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Plan generator unavailable, running degraded");
                None
            }
        };

    let port = config.port;
    let _handle = webpilot_server::start(config, generator).await?;

    tracing::info!(port = port, "Webpilot server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    Ok(())
}

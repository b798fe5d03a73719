// Advisor service entry point.
//
// Startup sequence:
// 1. Initialize tracing (stdout)
// 2. Load config, copying defaults/ on first run
// 3. Build the LLM client (disabled without an API key)
// 4. Build the engine and router
// 5. Serve until Ctrl+C

use std::sync::Arc;

use advisor_core::config;
use advisor_llm::LlmClient;
use advisor_server::engine::AnalyticsEngine;
use advisor_server::http::{self, AppState};

use anyhow::Context;
use tracing::{info, warn};

const DEFAULT_FILTER: &str =
    "advisor=info,advisor_server=info,advisor_core=info,advisor_llm=info,tower_http=info,warn";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("Advisor starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: analysis model {}, schema model {}, recommendations model {}",
        config.llm.analysis.model,
        config.llm.schema_understanding.model,
        config.llm.recommendations.model
    );

    let llm = LlmClient::from_config(&config).context("failed to build LLM client")?;
    if matches!(llm, LlmClient::Disabled) {
        warn!(
            "No API key in config/credentials.toml or {}; analysis requests will fail",
            config::API_KEY_ENV
        );
    }

    let engine = AnalyticsEngine::from_config(&config, Arc::new(llm));
    let app = http::router(AppState::new(engine), &config.server)
        .context("invalid CORS origin in server.toml")?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Advisor shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Ctrl+C received, shutting down");
}

/// Initialize tracing to stdout.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}

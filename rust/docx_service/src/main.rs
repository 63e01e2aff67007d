use anyhow::{Context, Result};
use clap::Parser;
use docx_service::logging::init_tracing;
use docx_service::{router, AppState, Config};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Config::parse();

    let state = AppState::from_config(&config);
    if let Some(version) = state.pandoc.version().await {
        tracing::info!(%version, "pandoc available");
    } else {
        tracing::warn!(binary = %config.pandoc.display(), "pandoc not found; only the builtin engine will work");
    }
    if config.api_key.is_none() {
        tracing::warn!("no API key configured; running without authentication");
    }

    let app = router(state);
    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("bind {}", config.addr))?;
    tracing::info!(
        addr = %config.addr,
        engine = ?config.engine,
        max_body_bytes = config.max_body_bytes,
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

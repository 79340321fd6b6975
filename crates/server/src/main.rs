//! mathsvg server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use mathsvg_core::{AppConfig, TieredCache};
use mathsvg_render::{FormulaService, StubRenderer};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .init();

    tracing::info!(
        redis_enabled = config.cache.redis_enabled,
        request_timeout_ms = config.server.request_timeout_ms,
        "Starting mathsvg server on stdio transport"
    );

    let cache = TieredCache::connect(&config.cache).await?;
    let service = FormulaService::new(cache.clone(), Arc::new(StubRenderer::new()), &config.server);
    let handler = handler::MathSvgServer::new(service, config.server.request_timeout());

    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    tokio::select! {
        result = server.waiting() => {
            result?;
            tracing::info!("client disconnected");
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("shutdown signal received");
        }
    }

    match tokio::time::timeout(config.server.shutdown_timeout(), cache.close()).await {
        Ok(Ok(())) => tracing::info!("cache closed"),
        Ok(Err(e)) => tracing::warn!(error = %e, "cache close failed"),
        Err(_) => tracing::warn!(
            timeout_ms = config.server.shutdown_timeout_ms,
            "cache close timed out, pending remote writes abandoned"
        ),
    }

    Ok(())
}

/// MCP Server Entry Point
///
/// Reads the configuration from the environment (see `core::config`), builds
/// the tool catalog, and starts the selected transport: HTTP + SSE, STDIO, or
/// both at once.
///
/// Logging is filtered by RUST_LOG (default "info"); LOG_FORMAT=json switches
/// the output to JSON lines.

mod core;
mod tools;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::core::config::{ServerConfig, TransportMode};
use crate::core::dispatcher::{Dispatcher, ServerInfo};
use crate::core::executor::OperationExecutor;
use crate::core::server;
use crate::core::session::SessionManager;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Log to stderr so STDIO mode keeps stdout for JSON-RPC
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let (registry, executor) = tools::initialize_tools(&config);
    if registry.is_empty() {
        tracing::warn!("no tools registered");
    }
    tracing::info!(name = %config.name, version = %config.version, tools = registry.len(), "loaded tool catalog");
    for tool in registry.list_descriptors() {
        tracing::debug!("  - {}: {}", tool.name, tool.description);
    }

    let sessions = Arc::new(SessionManager::new(config.keep_alive));
    let executor: Arc<dyn OperationExecutor> = Arc::new(executor);
    let dispatcher = Arc::new(Dispatcher::new(
        ServerInfo {
            name: config.name.clone(),
            version: config.version.clone(),
        },
        Arc::new(registry),
        executor,
        sessions.clone(),
    ));

    match config.transport {
        TransportMode::Stdio => server::run_server_stdio(dispatcher).await,
        TransportMode::Http => server::run_server_http(&config, dispatcher, sessions).await,
        TransportMode::Both => {
            // STDIO in the background, HTTP in the foreground
            let stdio_dispatcher = dispatcher.clone();
            let stdio_handle = tokio::spawn(async move {
                if let Err(e) = server::run_server_stdio(stdio_dispatcher).await {
                    tracing::error!(error = %e, "STDIO server error");
                }
            });

            let http_result = server::run_server_http(&config, dispatcher, sessions).await;

            // If HTTP server exits, abort STDIO task
            stdio_handle.abort();

            http_result
        }
    }
}

//! gale - serve a directory through the dispatch engine
//!
//! Configured from the environment:
//! - `GALE_HOST` / `GALE_PORT` - bind address (default `0.0.0.0:8054`)
//! - `GALE_HOME` - web root (default `./`)
//! - `GALE_FILE_CACHE` - cache files smaller than this many bytes (0 = off)
//! - `GALE_LIST_DIR` - `1` or `true` to list directories
//! - `GALE_SESSION_DIR` - persist sessions as files under this directory
//! - `RUST_LOG` - log filter (default `info`)

use gale_core::{App, Result, ServerConfig, Server, SessionConfig, Settings};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn settings_from_env() -> Settings {
    let mut settings = Settings::new(std::env::var("GALE_HOME").unwrap_or_else(|_| "./".to_string()));

    if let Some(size) = std::env::var("GALE_FILE_CACHE").ok().and_then(|v| v.parse().ok()) {
        settings = settings.file_cache_size(size);
    }
    settings = settings.list_dir(env_flag("GALE_LIST_DIR"));

    if let Ok(dir) = std::env::var("GALE_SESSION_DIR") {
        settings = settings.session(SessionConfig::new().dir(dir));
    }
    settings
}

fn server_config_from_env() -> ServerConfig {
    let mut config = ServerConfig::new();
    if let Ok(host) = std::env::var("GALE_HOST") {
        config = config.hostname(host);
    }
    if let Some(port) = std::env::var("GALE_PORT").ok().and_then(|v| v.parse().ok()) {
        config = config.port(port);
    }
    config
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = server_config_from_env();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let settings = settings_from_env();
        tracing::info!(home = %settings.home.display(), workers = config.workers, "Starting gale");

        let app = Arc::new(App::new(settings));
        let server = Server::new(app, config);

        server
            .run_until(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
            })
            .await?;

        if !server.tracker().drain(std::time::Duration::from_secs(10)).await {
            tracing::warn!(active = server.tracker().count(), "Connections still open at exit");
        }
        Ok(())
    })
}

pub mod cli;
pub mod config;
pub mod downloader;
pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use cli::Args;
use config::AppConfig;
use downloader::backends::YtDlpExtractor;
use downloader::orchestrator::Orchestrator;
use downloader::ranking::RankingMode;
use downloader::tools;
use server::AppState;

/// Load config, locate (or install) yt-dlp and serve until Ctrl-C
pub async fn run(args: Args) -> Result<()> {
    let config_path = match args.config {
        Some(path) => path,
        None => AppConfig::default_path()?,
    };
    let config = AppConfig::load_or_init(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let catalog = config.catalog();
    let overrides = config.override_table();
    info!(
        path = %config_path.display(),
        destinations = catalog.len(),
        overrides = overrides.len(),
        "Loaded config"
    );
    for entry in catalog.entries() {
        debug!(
            id = %entry.id,
            name = %entry.name,
            path = %entry.filesystem_path,
            keywords = ?entry.keywords,
            "Destination"
        );
    }
    for rule in overrides.entries() {
        debug!(
            pattern = %rule.url_pattern,
            cookies = ?rule.cookies,
            format = ?rule.format,
            "Url override"
        );
    }

    let tool = tools::ensure_tool(
        config.ytdlp_path.as_deref(),
        config.auto_install,
        &tools::InstallCommand::detect(),
    )
    .await;
    if tool.is_available {
        info!(path = %tool.path, version = ?tool.version, "Found {}", tool.name);
    } else {
        warn!(
            path = %tool.path,
            "{} is not runnable; every request will fail until it is installed",
            tool.name
        );
    }

    let extractor = YtDlpExtractor::new(tool.path)
        .with_quiet(config.quiet)
        .with_deadline(config.command_timeout());
    let orchestrator = Arc::new(Orchestrator::new(
        catalog,
        overrides,
        RankingMode::from_score_tags(config.score_tags),
        Arc::new(extractor),
    ));
    let state = AppState::new(orchestrator, config.queue_capacity);

    let port = args.port.unwrap_or(config.port);
    let listener = TcpListener::bind((config.host.as_str(), port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, port))?;

    server::serve(listener, state, shutdown_signal()).await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(err) => {
            error!(error = %err, "Failed to listen for Ctrl-C; running until killed");
            std::future::pending::<()>().await;
        }
    }
}

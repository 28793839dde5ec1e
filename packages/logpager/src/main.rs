use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::prelude::*;

use logpager::backend::Target;
use logpager::config::{CliOverrides, Config, DEFAULT_CONFIG_FILE};
use logpager::{AppState, create_router};

#[derive(Parser, Debug)]
#[command(name = "logpager")]
#[command(about = "Page through and search a log file from the browser")]
struct Args {
    /// File to serve: a local path, `user@host:/path` or `user@host:port:/path`
    target: Target,

    /// Config file (TOML)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Host to bind to
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the HTTP server (0 for automatic)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bytes per page
    #[arg(long)]
    page_size: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let default_directive = if args.debug {
        "logpager=debug,tower_http=debug,info"
    } else {
        "logpager=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let config = Config::load(
        &args.config,
        CliOverrides {
            host: args.host,
            port: args.port,
            page_size: args.page_size,
        },
    )
    .context("Failed to load configuration")?;

    info!("Serving {} ({} byte pages)", args.target, config.session.page_size);

    let state = AppState::new(args.target, config.session, config.ssh);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;

    // Get the actual bound address (important when port was 0)
    let actual_addr = listener.local_addr()?;

    // Machine-readable first
    println!("LOGPAGER_ADDR={}", actual_addr);

    info!("Listening on http://{}", actual_addr);
    info!("");
    info!("Endpoints:");
    info!("  GET  /        - Web UI");
    info!("  GET  /log     - WebSocket paging session");
    info!("  GET  /health  - Liveness probe");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")
}

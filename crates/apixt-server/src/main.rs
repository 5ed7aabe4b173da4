//! apixt-server: demo orders API with request tracing
//!
//! Send `Tls-Apixt-Dump: 1` with any request to get its trace instead of
//! its response, and `Tls-Apixt-Halt: <checkpoint>` to stop at a block.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use apixt::{Config, config};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Demo orders API traced by apixt
#[derive(Parser)]
#[command(name = "apixt-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to .apixt directory or config file (default: search for .apixt/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "APIXT_PORT", default_value = "3000")]
    port: u16,

    /// Write logs to daily rotating files in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize logging to stderr.
fn init_logging(verbose: bool) {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter(verbose))
        .init();
}

/// Initialize logging to rotating files in `logs_dir`.
fn init_file_logging(logs_dir: &Path, verbose: bool) {
    if let Err(e) = std::fs::create_dir_all(logs_dir) {
        eprintln!("Warning: Failed to create logs directory: {}", e);
        init_logging(verbose);
        return;
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, logs_dir, "apixt-server.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard stops the writer thread.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(env_filter(verbose))
        .init();
}

/// Load config from an explicit path, or discover `.apixt/config.toml`
/// upward from the working directory. Falls back to demo settings.
fn load_config(override_path: Option<&PathBuf>, base_url: &str) -> Result<Config> {
    if let Some(path) = override_path {
        let config_file = if path.is_dir() {
            path.join(config::CONFIG_FILE)
        } else {
            path.clone()
        };
        let config = Config::from_file(&config_file)
            .with_context(|| format!("Failed to load config from {}", config_file.display()))?;
        info!("Loaded config from {}", config_file.display());
        return Ok(config);
    }

    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    match Config::find_and_load_from(&cwd) {
        Ok(Some((config, apixt_dir))) => {
            info!("Found config at {}", apixt_dir.display());
            Ok(config)
        }
        Ok(None) => {
            tracing::debug!("No .apixt/config.toml found, using demo defaults");
            Ok(Config::new("apixt-demo", base_url, "/_apixt"))
        }
        Err(e) => {
            tracing::warn!("Error searching for config: {}, using demo defaults", e);
            Ok(Config::new("apixt-demo", base_url, "/_apixt"))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.log_dir {
        Some(dir) => init_file_logging(dir, cli.verbose),
        None => init_logging(cli.verbose),
    }

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    let config = load_config(cli.config.as_ref(), &format!("http://{addr}"))?.apply_env();
    for problem in config.validate() {
        tracing::error!("{}", problem);
    }

    let apixt = apixt_server::build(config)?;
    info!(
        api_id = %apixt.config().api_id,
        enabled = apixt.is_active(),
        dump_header = %apixt.config().dump_header,
        "Request tracing configured"
    );

    let listener = TcpListener::bind(addr).await?;
    apixt_server::run_with_shutdown(listener, apixt_server::app(apixt), async {
        if signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, shutting down...");
        }
    })
    .await?;

    info!("apixt demo server stopped");
    Ok(())
}

//! Painter Daemon - Keeps pixel-art patterns painted on a shared canvas
//!
//! # Usage
//!
//! ```bash
//! # Patterns from the config file (~/.config/canvas-painter/painter.toml)
//! painter-daemon
//!
//! # Patterns on the command line, highest priority first
//! painter-daemon --pattern 100,200,logo.png --pattern 0,0,border.png
//!
//! # Against a local test server
//! painter-daemon --base-url http://localhost:8080/sp --realtime-url ws://localhost:8080/sp/ws
//!
//! # Verbose logging
//! RUST_LOG=debug painter-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown (realtime close handshake, final stats)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use painter_core::config::{load_config_from_path, ConfigOverrides, PatternEntry};
use painter_core::{CanvasState, Engine, HttpCanvasClient, Reconciler};

/// Painter Daemon - keeps pixel-art patterns painted on a shared canvas
#[derive(Parser, Debug)]
#[command(name = "painter-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "PAINTER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Service root for snapshot and edit requests
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// WebSocket endpoint for realtime edits
    #[arg(long, value_name = "URL")]
    realtime_url: Option<String>,

    /// Cost budget per rate window
    #[arg(long, value_name = "COST")]
    budget: Option<u32>,

    /// Pattern to maintain, as x,y,path (repeatable, first has priority)
    #[arg(short = 'p', long = "pattern", value_name = "X,Y,PATH", value_parser = parse_pattern)]
    patterns: Vec<PatternEntry>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "PAINTER_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn parse_pattern(spec: &str) -> Result<PatternEntry, String> {
    PatternEntry::parse(spec).map_err(|e| e.to_string())
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(url) = &self.base_url {
            overrides = overrides.with_base_url(url.clone());
        }
        if let Some(url) = &self.realtime_url {
            overrides = overrides.with_realtime_url(url.clone());
        }
        if let Some(budget) = self.budget {
            overrides = overrides.with_budget(budget);
        }
        for entry in &self.patterns {
            overrides = overrides.with_pattern(entry.clone());
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("painter_daemon={level},painter_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("Painter daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = args
        .config
        .clone()
        .or_else(painter_core::config::default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;
    info!(source = %config.source(), "Configuration loaded");

    if config.patterns.is_empty() {
        warn!("No patterns configured; the painter will only mirror the canvas");
    }
    let sources = config.load_patterns().context("Failed to load patterns")?;
    let reconciler = Reconciler::new(sources);

    let remote = Arc::new(
        HttpCanvasClient::new(config.remote.clone()).context("Failed to create HTTP client")?,
    );
    let canvas = Arc::new(CanvasState::new(config.canvas));

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    let handle = Engine::new(config, remote, reconciler).start(canvas);

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
        _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
    }

    let stats = handle.stop().await;
    info!(
        issued = stats.paint.issued,
        committed = stats.paint.committed,
        rate_limited = stats.paint.rate_limited,
        rejected = stats.paint.rejected,
        version = stats.canvas_version,
        "Painter daemon stopped cleanly"
    );
    Ok(())
}

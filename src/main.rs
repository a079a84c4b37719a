use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use camrelay::config::{self, AppConfig, SourceKind, CONFIG_ENV};
use camrelay::state::AppState;
use camrelay::web;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// camrelay command line arguments
#[derive(Parser, Debug)]
#[command(name = "camrelay")]
#[command(version, about = "MJPEG live camera server", long_about = None)]
struct CliArgs {
    /// Path to a TOML config file
    #[arg(short = 'c', long, value_name = "FILE", env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides config)
    #[arg(short = 'p', long, value_name = "PORT")]
    http_port: Option<u16>,

    /// Frame source: command or pattern
    #[arg(long, value_name = "SOURCE")]
    source: Option<SourceKind>,

    /// Capture width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Capture height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Capture frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// JPEG quality (1-100)
    #[arg(long)]
    quality: Option<u8>,

    /// Encoder program for the command source
    #[arg(long, value_name = "PROGRAM")]
    command: Option<String>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting camrelay v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let ip: IpAddr = config
        .web
        .bind_address
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid bind address: {}", config.web.bind_address))?;
    let addr = SocketAddr::new(ip, config.web.http_port);

    tracing::info!(
        "Capture: {} source at {}x{} {}fps, quality {}",
        config.capture.source,
        config.capture.width,
        config.capture.height,
        config.capture.fps,
        config.capture.quality
    );

    let state = AppState::from_config(config);

    // The camera must be producing before we accept clients
    state
        .capture
        .start()
        .await
        .context("Failed to start frame capture")?;

    let app = web::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Serving on http://{}", listener.local_addr()?);
    tracing::info!("Open http://<pi-ip>:{}/ in a browser", addr.port());

    let shutdown = {
        let state = state.clone();
        async move {
            shutdown_signal().await;
            state.begin_shutdown().await;
        }
    };

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    // Covers the server ending on its own
    state.capture.stop().await;

    if let Err(e) = result {
        tracing::error!("HTTP server error: {}", e);
        return Err(e.into());
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Apply CLI overrides on top of file/default configuration
fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(ref addr) = args.address {
        config.web.bind_address = addr.clone();
    }
    if let Some(port) = args.http_port {
        config.web.http_port = port;
    }
    if let Some(source) = args.source {
        config.capture.source = source;
    }
    if let Some(width) = args.width {
        config.capture.width = width;
    }
    if let Some(height) = args.height {
        config.capture.height = height;
    }
    if let Some(fps) = args.fps {
        config.capture.fps = fps;
    }
    if let Some(quality) = args.quality {
        config.capture.quality = quality;
    }
    if let Some(ref command) = args.command {
        config.capture.command = Some(command.clone());
    }
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT, shutting down...");
        }
        _ = terminate() => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

impl LogLevel {
    /// `-v` flags win over `--log-level`
    fn with_verbosity(self, verbose: u8) -> Self {
        match verbose {
            0 => self,
            1 => LogLevel::Verbose,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Filter directives for our crate and the HTTP trace layer
    fn directives(self) -> String {
        let (app, http) = match self {
            LogLevel::Error => ("error", "error"),
            LogLevel::Warn => ("warn", "warn"),
            LogLevel::Info => ("info", "info"),
            LogLevel::Verbose => ("debug", "info"),
            LogLevel::Debug => ("debug", "debug"),
            LogLevel::Trace => ("trace", "debug"),
        };
        format!("camrelay={app},tower_http={http}")
    }
}

/// Install the tracing subscriber; `RUST_LOG` replaces the CLI level
fn init_logging(level: LogLevel, verbose: u8) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.with_verbosity(verbose).directives().into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_overrides_level() {
        assert_eq!(
            LogLevel::Warn.with_verbosity(0).directives(),
            "camrelay=warn,tower_http=warn"
        );
        assert_eq!(
            LogLevel::Error.with_verbosity(1).directives(),
            "camrelay=debug,tower_http=info"
        );
        assert_eq!(
            LogLevel::Info.with_verbosity(5).directives(),
            "camrelay=trace,tower_http=debug"
        );
    }

    #[test]
    fn test_cli_overrides_apply() {
        let args = CliArgs::parse_from(["camrelay", "-p", "9000", "--source", "pattern", "--fps", "5"]);
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.web.http_port, 9000);
        assert_eq!(config.capture.source, SourceKind::Pattern);
        assert_eq!(config.capture.fps, 5);
        assert_eq!(config.capture.width, 960);
    }
}

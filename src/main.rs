use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use passgate::config::PassgateConfig;
use passgate::http::{router, AppState, HttpServer};
use passgate::ratelimit::spawn_sweeper;

/// Password-gated token service.
#[derive(Debug, Parser)]
#[command(name = "passgate", version, about)]
struct Cli {
    /// Path to a configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Starting Passgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = PassgateConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
    }
    info!(
        bind_addr = %config.server.bind_addr,
        max_attempts = config.rate_limiting.max_attempts,
        window_ms = config.rate_limiting.window_ms,
        development = config.server.development,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config)?;
    if let Some(reason) = state.gatekeeper.misconfiguration() {
        error!(reason = reason, "Auth endpoints will refuse requests until configured");
    }
    if config.server.development {
        warn!("Development mode enabled: error detail is exposed and localhost origins are allowed");
    }

    let sweeper = spawn_sweeper(state.limiter.clone());

    let app = router(state, &config.cors);
    let server = HttpServer::new(config.server.bind_addr, app);

    let result = server.serve_with_shutdown(shutdown_signal()).await;
    sweeper.abort();

    result?;
    info!("Passgate stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

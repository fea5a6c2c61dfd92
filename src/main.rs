use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tollgate::config::{LogFormat, LoggingConfig, Strategy, TollgateConfig};
use tollgate::http::{HttpServer, RateLimitState};
use tollgate::ratelimit::{self, Sweeper};

/// Per-client HTTP rate limiting service.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "TOLLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Override the admission strategy
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = TollgateConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.http_addr = bind;
    }
    if let Some(strategy) = cli.strategy {
        config.rate_limiting.strategy = strategy;
        config.validate()?;
    }

    init_tracing(&config.logging);

    info!("Starting Tollgate Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &cli.config {
        info!(path = %path.display(), "Loaded configuration file");
    }
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    // Initialize the rate limiter and its sweeper
    let backend = ratelimit::build_backend(&config.rate_limiting)?;
    let sweeper = Sweeper::spawn(
        backend.clone(),
        ratelimit::sweep_interval(&config.rate_limiting, backend.as_ref()),
    );

    let state = RateLimitState::new(backend, config.rate_limiting.trust_forwarded_headers);
    let server = HttpServer::bind(config.server.http_addr, state).await?;

    info!("Starting HTTP server on {}", server.local_addr()?);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    sweeper.stop().await;

    info!("Tollgate Rate Limiting Service stopped");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
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

//! speechless - experiment configurations, training runs and recordings for speech recognition.

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use speechless::cli::{self, Cli};

/// Cancel `cancel` on Ctrl+C.
fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down...");
                cancel.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| if cli.verbose { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    debug!("speechless v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    // Workflows block on file and device I/O
    let result = tokio::task::spawn_blocking(move || cli::run(cli, cancel)).await?;
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

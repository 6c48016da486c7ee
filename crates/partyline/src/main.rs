//! Partyline binary: reads configuration from the environment and serves
//! until Ctrl+C or SIGTERM.

use partyline::{PartylineError, PartylineServerBuilder, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), PartylineError> {
    init_tracing();

    let config = ServerConfig::from_env();
    tracing::info!(addr = %config.bind_addr, idle_timeout = ?config.idle_timeout, "starting server");

    let server = PartylineServerBuilder::from_config(config).build().await?;
    server.run_until(shutdown_signal()).await
}

/// Logs to stdout, filtered by `RUST_LOG` (default `info`).
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

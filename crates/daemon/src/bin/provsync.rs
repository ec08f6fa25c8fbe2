//! provsync: keeps a dashboarding server's provisioned config in sync with disk.
//!
//! Configuration comes from the environment (and an optional `.env` file).
//! Exit codes: 0 after SIGINT/SIGTERM, 1 on any fatal startup error.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use provsync_api::ApiClient;
use provsync_core::config::{self, Config};
use provsync_daemon::Daemon;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    config::load_dotenv();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(config).await {
        Ok(()) => {
            info!("provsync exited cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "fatal error, exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    config.log_summary();

    let api = Arc::new(ApiClient::from_config(&config.server));
    let mut daemon = Daemon::new(config, api);

    daemon.run_until(wait_for_shutdown()).await?;
    Ok(())
}

async fn wait_for_shutdown() {
    match shutdown_signal().await {
        Ok(signal) => info!(signal, "received signal, exiting"),
        Err(e) => {
            // Without signal handlers the process can only be killed.
            warn!(error = %e, "failed to install signal handlers");
            std::future::pending::<()>().await;
        }
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => Ok("SIGINT"),
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("ctrl_c")
    }
}

//! Process lifecycle and graceful shutdown.
//!
//! On Ctrl+C or SIGTERM:
//! 1. The HTTP server stops accepting connections and drains in-flight requests
//! 2. The sweeper is signalled and finishes its current pass
//! 3. The process exits once the sweeper stops or the shutdown timeout passes

use axum::Router;
use std::time::Duration;
use ticket_holds_runtime::SweeperHandle;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Serve `app` until a shutdown signal, then stop the sweeper.
///
/// # Errors
///
/// Returns an error if the HTTP server fails.
pub async fn run(
    listener: TcpListener,
    app: Router,
    sweeper: SweeperHandle,
    shutdown_timeout: Duration,
) -> anyhow::Result<()> {
    info!(address = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, stopping sweeper");

    match tokio::time::timeout(shutdown_timeout, sweeper.shutdown()).await {
        Ok(Ok(())) => info!("Sweeper stopped gracefully"),
        Ok(Err(e)) => warn!(error = %e, "Sweeper task failed"),
        Err(_) => warn!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Sweeper shutdown timed out"
        ),
    }

    info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
///
/// If a handler cannot be installed that branch never fires, so the other
/// signal still works.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
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
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

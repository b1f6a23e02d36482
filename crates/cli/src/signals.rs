//! Ctrl+C / SIGTERM handling for a running scan.

use tracing::{info, warn};

use mr_conflict_core::CancelSignal;

/// Spawn a task that triggers `cancel` on SIGTERM or SIGINT (Ctrl+C).
pub fn install(cancel: CancelSignal) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            info!("received SIGINT (Ctrl+C), cancelling scan");
                        }
                        _ = sigterm.recv() => {
                            info!("received SIGTERM, cancelling scan");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to register SIGTERM handler");
                    if let Err(e) = ctrl_c.await {
                        warn!(error = %e, "failed to listen for Ctrl+C");
                        return;
                    }
                    info!("received SIGINT (Ctrl+C), cancelling scan");
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = ctrl_c.await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("received Ctrl+C, cancelling scan");
        }

        cancel.trigger();
    });
}

// Signal handling module
//
// Supported signals:
// - SIGTERM: Graceful shutdown
// - SIGINT:  Graceful shutdown (Ctrl+C)
//
// Other platforms only get Ctrl+C.

/// Resolve once a termination request arrives
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::error!("Failed to register SIGTERM handler: {e}; only Ctrl+C will stop the server");
            wait_for_ctrl_c().await;
            return;
        }
    };

    tracing::info!("[SIGNAL] Process ID: {}", std::process::id());
    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("[SIGNAL] SIGTERM received, initiating graceful shutdown");
        }
        () = wait_for_ctrl_c() => {
            tracing::info!("[SIGNAL] SIGINT received, initiating graceful shutdown");
        }
    }
}

/// Windows fallback - only handles Ctrl+C
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    wait_for_ctrl_c().await;
    tracing::info!("[SIGNAL] Ctrl+C received, initiating graceful shutdown");
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}

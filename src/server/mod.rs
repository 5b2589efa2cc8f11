// Server module entry
// Accept loop, connection serving and graceful shutdown

pub mod connection;
pub mod listener;
pub mod signal;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use hyper_util::server::graceful::GracefulShutdown;

use crate::config::Config;
use crate::logger;
use connection::{accept_connection, ServerContext};
use listener::create_listener;

/// Serve until SIGTERM/SIGINT, then drain open connections for at most
/// `performance.shutdown_grace` seconds.
pub async fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.get_socket_addr()?;
    let listener = create_listener(addr)?;
    let ctx = Arc::new(ServerContext::new(config));
    let graceful = GracefulShutdown::new();

    logger::log_server_start(&listener.local_addr()?, config);

    let shutdown = signal::shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => accept_connection(stream, peer_addr, &ctx, &graceful),
                    Err(e) => tracing::error!("Failed to accept connection: {e}"),
                }
            }

            () = &mut shutdown => break,
        }
    }

    // Stop accepting before draining
    drop(listener);
    let open = ctx.active_connections.load(Ordering::SeqCst);
    tracing::info!("[SHUTDOWN] Listener closed, draining {open} open connection(s)");

    let grace = Duration::from_secs(config.performance.shutdown_grace);
    tokio::select! {
        () = graceful.shutdown() => {
            tracing::info!("[SHUTDOWN] All connections closed");
        }
        () = tokio::time::sleep(grace) => {
            tracing::warn!(
                "[SHUTDOWN] Grace period of {}s elapsed with {} connection(s) still open",
                grace.as_secs(),
                ctx.active_connections.load(Ordering::SeqCst)
            );
        }
    }
    Ok(())
}

//! Logger module
//!
//! Provides logging utilities for the server including:
//! - Subscriber installation (level, stdout or file target)
//! - Server lifecycle logging and the startup banner
//! - Access logging with multiple formats

mod format;
pub mod writer;

pub use format::AccessLogEntry;

use crate::config::Config;
use std::net::SocketAddr;

/// Static text served on `/` and printed at startup
pub const BANNER: &str = r"
╔══════════════════════════════════════╗
║           File as a Service          ║
║                                      ║
║  Drop an index.js into a folder and  ║
║  its path becomes an HTTP endpoint   ║
╚══════════════════════════════════════╝
";

/// Install the global tracing subscriber
///
/// Should be called once at application startup.
pub fn init(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let level: tracing::Level = config
        .logging
        .level
        .parse()
        .map_err(|e| format!("Invalid logging.level '{}': {e}", config.logging.level))?;
    let writer = writer::LogWriter::open(config.logging.log_file.as_deref())?;
    let ansi = !writer.is_file();

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false)
        .try_init()
        .map_err(|e| e.to_string())?;
    Ok(())
}

pub fn print_banner() {
    println!("{BANNER}");
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    tracing::info!("======================================");
    tracing::info!("Listening on: http://{addr}");
    tracing::info!("Handler root: {}", config.handler_root().display());
    tracing::info!("Log level: {}", config.logging.level);
    if let Some(workers) = config.server.workers {
        tracing::info!("Worker threads: {workers}");
    }
    if let Some(ref path) = config.logging.log_file {
        tracing::info!("Log file: {path}");
    }
    if let Some(timeout) = config.handlers.timeout_ms {
        tracing::info!("Handler timeout: {timeout}ms");
    }
    tracing::info!("Max body size: {} bytes", config.http.max_body_size);
    tracing::info!("======================================");
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    tracing::error!("Failed to serve connection: {err:?}");
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    tracing::info!(target: "access", "{}", entry.format(format));
}

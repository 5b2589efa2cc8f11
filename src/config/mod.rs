// Configuration module entry point
// Loads configuration from file, FAAS_* environment variables and PORT

mod types;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub use types::Config;

/// Rejected configuration value
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from specified file path (without extension)
    /// Default config file is "config.toml" when no path specified
    pub fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        let port_override = std::env::var("PORT")
            .ok()
            .and_then(|p| p.trim().parse::<i64>().ok());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("FAAS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("handlers.root", ".")?
            .set_default("handlers.loop_iteration_limit", 10_000_000)?
            .set_default("handlers.recursion_limit", 512)?
            .set_default("http.server_name", "faas-server")?
            .set_default("http.max_body_size", 10_485_760)? // 10MB
            .set_default("performance.keep_alive", true)?
            .set_default("performance.connection_timeout", 60)?
            .set_default("performance.shutdown_grace", 10)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_override_option("server.port", port_override)?
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
        Self::load_from(&path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }
        if self.handlers.root.trim().is_empty() {
            return Err(ConfigError::Invalid("handlers.root must not be empty".into()));
        }
        if self.handlers.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "handlers.timeout_ms must be greater than zero".into(),
            ));
        }
        if self.handlers.loop_iteration_limit == 0 || self.handlers.recursion_limit == 0 {
            return Err(ConfigError::Invalid(
                "handlers limits must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }

    /// Absolute handler root; falls back to the joined path if it cannot be canonicalized
    pub fn handler_root(&self) -> PathBuf {
        let root = PathBuf::from(&self.handlers.root);
        root.canonicalize().unwrap_or_else(|_| {
            std::env::current_dir()
                .map(|cwd| cwd.join(&root))
                .unwrap_or(root)
        })
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handlers.timeout_ms.map(Duration::from_millis)
    }
}

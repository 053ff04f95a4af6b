// Configuration module entry point
// Loads layered configuration: file, environment, defaults

mod types;

use std::net::SocketAddr;

pub use types::{ApiConfig, Config, LoggingConfig, PerformanceConfig, ServerConfig};

/// Default config file name (without extension)
pub const DEFAULT_CONFIG_PATH: &str = "restmux";

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("invalid api prefix '{0}': must start and end with '/'")]
    Prefix(String),
    #[error("invalid address: {0}")]
    Address(#[from] std::net::AddrParseError),
}

impl Config {
    /// Load configuration from specified file path (without extension)
    ///
    /// Environment variables `RESTMUX_<SECTION>__<KEY>` override the file.
    pub fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("RESTMUX").separator("__"))
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.backlog", 128)?
            .set_default("api.prefix", "/api/")?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive", true)?
            .set_default("performance.connection_timeout", 75)?
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(format!("{}:{}", self.server.host, self.server.port).parse()?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.api.prefix;
        if !prefix.starts_with('/') || !prefix.ends_with('/') {
            return Err(ConfigError::Prefix(prefix.clone()));
        }
        Ok(())
    }
}

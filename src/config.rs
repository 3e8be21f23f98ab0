use std::path::PathBuf;
use serde::Deserialize;
use config::Config;
use crate::utils::error::ProtocolError;

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default bind port.
pub const DEFAULT_PORT: u16 = 65432;
/// Default bound on concurrently active sessions.
pub const DEFAULT_MAX_CLIENTS: usize = 3;
/// Default file area, relative to the working directory.
pub const DEFAULT_FILE_DIR: &str = "server_files";

/// Configuration settings for the line protocol server.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// The host the listener binds to.
    pub host: String,
    /// The port on which the server will listen.
    pub port: u16,
    /// The maximum number of simultaneously active sessions.
    pub max_clients: usize,
    /// Root directory backing `list` and file delivery.
    pub file_dir: PathBuf,
    /// Port for the Prometheus `/metrics` endpoint; disabled when absent.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            file_dir: PathBuf::from(DEFAULT_FILE_DIR),
            metrics_port: None,
        }
    }
}

impl ServerConfig {
    /// Loads the server configuration from environment variables.
    ///
    /// Environment variables should be prefixed with `LP_` (`LP_PORT`, `LP_MAX_CLIENTS`, ...).
    /// Anything left unset falls back to the defaults above.
    ///
    /// # Errors
    /// Returns a `ProtocolError::ConfigurationError` if the configuration cannot be loaded.
    pub fn from_env() -> Result<Self, ProtocolError> {
        Config::builder()
            .set_default("host", DEFAULT_HOST)
            .and_then(|b| b.set_default("port", DEFAULT_PORT as i64))
            .and_then(|b| b.set_default("max_clients", DEFAULT_MAX_CLIENTS as i64))
            .and_then(|b| b.set_default("file_dir", DEFAULT_FILE_DIR))
            .map_err(|e| ProtocolError::ConfigurationError(e.to_string()))?
            .add_source(config::Environment::with_prefix("LP"))
            .build()
            .map_err(|e| ProtocolError::ConfigurationError(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ProtocolError::ConfigurationError(e.to_string()))
    }

    /// Validates the configuration settings.
    ///
    /// # Errors
    /// Returns a `ProtocolError::ConfigurationError` if validation fails.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.max_clients == 0 {
            return Err(ProtocolError::ConfigurationError(
                "max_clients must be greater than 0".into()
            ));
        }

        if self.max_clients > 10_000 {
            return Err(ProtocolError::ConfigurationError(
                "max_clients cannot exceed 10,000".into()
            ));
        }

        if self.file_dir.as_os_str().is_empty() {
            return Err(ProtocolError::ConfigurationError(
                "file_dir must not be empty".into()
            ));
        }

        if self.metrics_port.is_some_and(|p| p != 0 && p == self.port) {
            return Err(ProtocolError::ConfigurationError(format!(
                "metrics_port {} collides with the protocol port",
                self.port
            )));
        }

        Ok(())
    }

    /// Returns the `host:port` string the listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

//! Configuration loading for collab-client.
//!
//! Configuration is loaded from a TOML file (e.g. `duet.toml`). Every field
//! has a default, so an empty file is a valid configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Root configuration for a Duet client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Pairing server endpoints.
    #[serde(default)]
    pub server: ServerConfig,
    /// Client identity and polling.
    #[serde(default)]
    pub client: ClientSection,
    /// Embedded sync engine bootstrap.
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Pairing server endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Base URL for HTTP calls and browser pages (default: https://localhost:4443).
    #[serde(default = "default_http_base")]
    pub http_base: String,
    /// Base URL for the collaboration transport (default: wss://localhost:4444).
    #[serde(default = "default_ws_base")]
    pub ws_base: String,
}

/// Client identity and polling.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSection {
    /// Version reported to `/hello` (default: this crate's version).
    #[serde(default = "default_client_version")]
    pub version: String,
    /// How often a pending operation checks for cancellation, in ms (default: 100).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Embedded sync engine bootstrap.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Server path of the engine script (default: /public/sharedb.js).
    #[serde(default = "default_script_path")]
    pub script_path: String,
    /// Entry point invoked once the script is loaded (default: sharedb).
    #[serde(default = "default_bootstrap_entry")]
    pub bootstrap_entry: String,
    /// Name under which the session host is exposed to the engine (default: session).
    #[serde(default = "default_host_binding")]
    pub host_binding: String,
}

// Default value functions
fn default_http_base() -> String {
    "https://localhost:4443".to_string()
}

fn default_ws_base() -> String {
    "wss://localhost:4444".to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_script_path() -> String {
    "/public/sharedb.js".to_string()
}

fn default_bootstrap_entry() -> String {
    "sharedb".to_string()
}

fn default_host_binding() -> String {
    "session".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_base: default_http_base(),
            ws_base: default_ws_base(),
        }
    }
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            version: default_client_version(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            script_path: default_script_path(),
            bootstrap_entry: default_bootstrap_entry(),
            host_binding: default_host_binding(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            client: ClientSection::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that both base URLs parse and use a fitting scheme.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_scheme("server.http_base", &self.server.http_base, &["http", "https"])?;
        check_scheme("server.ws_base", &self.server.ws_base, &["ws", "wss"])?;
        if self.client.version.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "client.version",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Set the HTTP base URL.
    pub fn with_http_base(mut self, base: &str) -> Self {
        self.server.http_base = base.to_string();
        self
    }

    /// Set the transport base URL.
    pub fn with_ws_base(mut self, base: &str) -> Self {
        self.server.ws_base = base.to_string();
        self
    }

    /// Set the version reported to the server.
    pub fn with_version(mut self, version: &str) -> Self {
        self.client.version = version.to_string();
        self
    }

    /// Set the cancellation poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.client.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Cancellation poll interval; never zero.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.client.poll_interval_ms.max(1))
    }
}

fn check_scheme(field: &'static str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        field,
        reason: e.to_string(),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(())
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value parsed but makes no sense.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

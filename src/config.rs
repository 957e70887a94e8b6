//! Configuration system for the p2p tracker
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (TRACKER_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Default TCP port
pub const DEFAULT_PORT: u16 = 4100;

/// Smallest accepted `max_message_bytes`
const MIN_MESSAGE_BYTES: usize = 64;

/// Largest accepted `max_message_bytes`
const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Main tracker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Listener and per-connection limits
    pub server: ServerSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Listener and connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind the listener on
    pub bind_address: String,

    /// TCP port (0 = let the OS choose)
    pub port: u16,

    /// Maximum size of one framed message in bytes
    pub max_message_bytes: usize,

    /// Frames that may be queued for a single peer before new ones are dropped
    pub outbox_capacity: usize,

    /// Timeout for writing one frame to a peer, in seconds
    pub write_timeout_secs: u64,

    /// Seconds a connection may stay unregistered (0 = no limit)
    pub registration_timeout_secs: u64,

    /// Maximum number of simultaneously open connections
    pub max_connections: usize,

    /// Async runtime worker threads (0 = auto)
    pub worker_threads: usize,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_message_bytes: 64 * 1024,
            outbox_capacity: 256,
            write_timeout_secs: 10,
            registration_timeout_secs: 30,
            max_connections: 1024,
            worker_threads: 0, // Auto-detect
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl ServerSettings {
    /// Check listener and connection limits
    pub fn validate(&self) -> Result<()> {
        if self.bind_address.trim().is_empty() {
            return Err(Error::config_field_invalid(
                "server.bind_address",
                "bind_address cannot be empty",
            ));
        }
        if self.bind_address.parse::<IpAddr>().is_err() {
            return Err(Error::config_field_invalid(
                "server.bind_address",
                format!("'{}' is not an IP address", self.bind_address),
            ));
        }

        if !(MIN_MESSAGE_BYTES..=MAX_MESSAGE_BYTES).contains(&self.max_message_bytes) {
            return Err(Error::config_field_invalid(
                "server.max_message_bytes",
                format!(
                    "max_message_bytes must be between {} and {}",
                    MIN_MESSAGE_BYTES, MAX_MESSAGE_BYTES
                ),
            ));
        }
        if self.outbox_capacity == 0 {
            return Err(Error::config_field_invalid(
                "server.outbox_capacity",
                "outbox_capacity must be at least 1",
            ));
        }
        if self.write_timeout_secs == 0 {
            return Err(Error::config_field_invalid(
                "server.write_timeout_secs",
                "write_timeout_secs must be at least 1",
            ));
        }
        if self.max_connections == 0 {
            return Err(Error::config_field_invalid(
                "server.max_connections",
                "max_connections must be at least 1",
            ));
        }

        Ok(())
    }

    /// The `host:port` string the listener binds to
    pub fn listen_addr(&self) -> String {
        match self.bind_address.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{}]:{}", ip, self.port),
            _ => format!("{}:{}", self.bind_address, self.port),
        }
    }

    /// Per-frame write timeout
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Registration deadline for new connections, if any
    pub fn registration_timeout(&self) -> Option<Duration> {
        match self.registration_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            config = Self::from_file(&path)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML configuration file
    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::IoRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            // Current directory
            Some(PathBuf::from("p2p-tracker.toml")),
            // User config directory
            dirs::config_dir().map(|p| p.join("p2p-tracker").join("tracker.toml")),
            // Home directory
            dirs::home_dir().map(|p| p.join(".p2p-tracker").join("tracker.toml")),
            // System config (Linux)
            Some(PathBuf::from("/etc/p2p-tracker/tracker.toml")),
        ];

        for path in search_paths.into_iter().flatten() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Server settings
        if let Ok(val) = std::env::var("TRACKER_BIND_ADDRESS") {
            self.server.bind_address = val;
        }
        if let Ok(val) = std::env::var("TRACKER_PORT") {
            if let Ok(n) = val.parse() {
                self.server.port = n;
            }
        }
        if let Ok(val) = std::env::var("TRACKER_MAX_MESSAGE_BYTES") {
            if let Ok(n) = val.parse() {
                self.server.max_message_bytes = n;
            }
        }
        if let Ok(val) = std::env::var("TRACKER_OUTBOX_CAPACITY") {
            if let Ok(n) = val.parse() {
                self.server.outbox_capacity = n;
            }
        }
        if let Ok(val) = std::env::var("TRACKER_WRITE_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                self.server.write_timeout_secs = n;
            }
        }
        if let Ok(val) = std::env::var("TRACKER_REGISTRATION_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                self.server.registration_timeout_secs = n;
            }
        }
        if let Ok(val) = std::env::var("TRACKER_MAX_CONNECTIONS") {
            if let Ok(n) = val.parse() {
                self.server.max_connections = n;
            }
        }
        if let Ok(val) = std::env::var("TRACKER_WORKER_THREADS") {
            if let Ok(n) = val.parse() {
                self.server.worker_threads = n;
            }
        }

        // Logging settings
        if let Ok(val) = std::env::var("TRACKER_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("TRACKER_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("TRACKER_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or(std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file, returning where it was written
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".p2p-tracker")
                .join("tracker.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# p2p-tracker configuration

[server]
# Address to bind the listener on
bind_address = "0.0.0.0"

# TCP port (0 = let the OS choose a free port)
port = 4100

# Maximum size of one newline-delimited message in bytes
max_message_bytes = 65536

# Frames queued per peer before further notifications to it are dropped
outbox_capacity = 256

# Timeout for writing one frame to a peer (seconds)
write_timeout_secs = 10

# Seconds a connection may stay unregistered (0 = no limit)
registration_timeout_secs = 30

# Maximum number of simultaneously open connections
max_connections = 1024

# Async runtime worker threads (0 = auto-detect)
worker_threads = 0

[logging]
# Log level: trace, debug, info, warn, error
level = "warn"

# Log file path (comment out to disable file logging)
# file = "~/.p2p-tracker/logs/tracker.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}

//! TOML-based configuration for the client binary.
//!
//! Reads and writes [`AppConfig`] at the platform-appropriate location:
//! - Windows:  `%APPDATA%\NADLink\config.toml`
//! - Linux:    `~/.config/nadlink/config.toml`
//! - macOS:    `~/Library/Application Support/NADLink/config.toml`
//!
//! A missing file is not an error — the defaults describe a TCP connection
//! on the Telnet port, which is what most network-attached receivers want.
//! Fields absent from an existing file fall back to their defaults via
//! `#[serde(default = "...")]`, so old config files keep working when new
//! fields are added.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::transport::{
    serial::DEFAULT_BAUD_RATE, tcp::DEFAULT_TCP_PORT, SerialTransport, TcpTransport, Transport,
};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub receiver: ReceiverConfig,
    #[serde(default)]
    pub client: ClientSettings,
}

/// Which link the receiver is attached through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Telnet over the network jack.
    #[default]
    Tcp,
    /// Rear-panel RS-232.
    Serial,
}

/// Connection parameters for the receiver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiverConfig {
    /// `"tcp"` or `"serial"`.
    #[serde(default)]
    pub transport: TransportKind,
    /// Hostname or IP address (TCP only).
    #[serde(default)]
    pub host: String,
    /// Telnet control port.
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    /// Serial device path, e.g. `/dev/ttyUSB0` or `COM3` (serial only).
    #[serde(default = "default_serial_path")]
    pub serial_path: String,
    /// RS-232 baud rate.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Lowest volume in dB the host layer should expose.
    #[serde(default = "default_min_volume")]
    pub min_volume: i32,
    /// Highest volume in dB the host layer should expose.
    #[serde(default = "default_max_volume")]
    pub max_volume: i32,
}

/// General client behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSettings {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ReceiverConfig {
    /// Builds the transport described by this configuration.
    pub fn build_transport(&self) -> Arc<dyn Transport> {
        match self.transport {
            TransportKind::Tcp => Arc::new(TcpTransport::new(self.host.clone(), self.tcp_port)),
            TransportKind::Serial => Arc::new(SerialTransport::new(
                self.serial_path.clone(),
                self.baud_rate,
            )),
        }
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}
fn default_serial_path() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
fn default_min_volume() -> i32 {
    -92
}
fn default_max_volume() -> i32 {
    -20
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Tcp,
            host: String::new(),
            tcp_port: default_tcp_port(),
            serial_path: default_serial_path(),
            baud_rate: default_baud_rate(),
            min_volume: default_min_volume(),
            max_volume: default_max_volume(),
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config
/// base directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory
/// cannot be determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads [`AppConfig`] from disk, returning `AppConfig::default()` if the
/// file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not
/// found", and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = config_file_path()?;

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to disk, creating the directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    let path = config_file_path()?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("NADLink"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("nadlink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("NADLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

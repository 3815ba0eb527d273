//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Recording parameters out of range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Recording parameters read by every worker at start time.
///
/// All values are in seconds. The field names double as the JSON wire
/// format of the `config` and `setConfig` control commands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordingConfig {
    /// Length of each segment file
    #[serde(default = "default_segment_time")]
    pub segment_time: u64,
    /// Delay before the first restart after an unexpected exit
    #[serde(default = "default_retry_interval")]
    pub retry_interval: u64,
    /// Upper bound for any single restart delay
    #[serde(default = "default_max_backoff")]
    pub max_backoff: u64,
}

fn default_segment_time() -> u64 {
    300
}

fn default_retry_interval() -> u64 {
    10
}

fn default_max_backoff() -> u64 {
    60
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            segment_time: default_segment_time(),
            retry_interval: default_retry_interval(),
            max_backoff: default_max_backoff(),
        }
    }
}

/// Largest number of seconds a recording field may hold; the store keeps
/// them as signed 64-bit integers.
pub const MAX_SECONDS: u64 = i64::MAX as u64;

impl RecordingConfig {
    /// Check the range constraints: `segment_time > 0`,
    /// `max_backoff >= retry_interval` and no field above [`MAX_SECONDS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("segment_time", self.segment_time),
            ("retry_interval", self.retry_interval),
            ("max_backoff", self.max_backoff),
        ] {
            if value > MAX_SECONDS {
                return Err(ConfigError::Invalid(format!(
                    "{name} ({value}) exceeds {MAX_SECONDS}"
                )));
            }
        }
        if self.segment_time == 0 {
            return Err(ConfigError::Invalid(
                "segment_time must be greater than zero".to_string(),
            ));
        }
        if self.max_backoff < self.retry_interval {
            return Err(ConfigError::Invalid(format!(
                "max_backoff ({}) must not be less than retry_interval ({})",
                self.max_backoff, self.retry_interval
            )));
        }
        Ok(())
    }
}

/// Control server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Address the control protocol listens on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "127.0.0.1:9000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Camera/config store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("nvr.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Capture process configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    /// Program launched once per camera
    #[serde(default = "default_program")]
    pub program: String,
}

fn default_program() -> String {
    "ffmpeg".to_string()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
        }
    }
}

/// Service behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ServiceConfig {
    /// Start a worker for every stored camera at boot
    #[serde(default)]
    pub autostart: bool,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    /// Seed values, written to the store only when it holds no config yet
    #[serde(default)]
    pub recording: RecordingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.recording.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - NVR_LISTEN_ADDR -> server.listen_addr
    /// - NVR_DATABASE_PATH -> store.database_path
    /// - NVR_CAPTURE_PROGRAM -> capture.program
    /// - NVR_AUTOSTART -> service.autostart
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("NVR_LISTEN_ADDR") {
            if !val.is_empty() {
                self.server.listen_addr = val;
            }
        }

        if let Ok(val) = env::var("NVR_DATABASE_PATH") {
            if !val.is_empty() {
                self.store.database_path = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("NVR_CAPTURE_PROGRAM") {
            if !val.is_empty() {
                self.capture.program = val;
            }
        }

        if let Ok(val) = env::var("NVR_AUTOSTART") {
            // Accept "true", "1", "yes" as true; "false", "0", "no" as false
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.service.autostart = true,
                "false" | "0" | "no" => self.service.autostart = false,
                _ => {} // Invalid value, keep existing
            }
        }
    }

    /// Load configuration from file and apply environment overrides. A
    /// missing file yields the defaults.
    ///
    /// The returned flag is `false` when the file did not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<(Self, bool), ConfigError> {
        let (mut config, found) = match Self::load_from_file(path) {
            Ok(config) => (config, true),
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                (Config::default(), false)
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        Ok((config, found))
    }
}

//! # Configuration Management
//!
//! Centralized configuration for the server.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()`
//!
//! Keys inside `[server]` and `[world]` use the kebab-case names operators
//! know from classic server configs (`server-port`, `max-players`, ...).

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default listen port
pub const DEFAULT_PORT: u16 = 25565;

/// Player slots can never exceed this; entity id 0xFF is reserved for "self".
pub const MAX_PLAYERS_LIMIT: u8 = 127;

/// Per-address connection cap ceiling
pub const MAX_CONNECTIONS_PER_IP_LIMIT: u8 = 5;

/// Key/value view over configuration, for collaborators that look settings up by name.
pub trait ConfigLookup {
    fn get_str(&self, key: &str) -> Option<String>;
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn get_int(&self, key: &str) -> Option<i64>;
}

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ServerConfig {
    /// Listener, identity and limits
    #[serde(default)]
    pub server: ListenerConfig,

    /// Main world
    #[serde(default)]
    pub world: WorldConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(ip) = std::env::var("VOXEL_SERVER_IP") {
            config.server.server_ip = ip;
        }

        if let Ok(port) = std::env::var("VOXEL_SERVER_PORT") {
            config.server.server_port = port
                .parse::<u16>()
                .map_err(|e| ProtocolError::ConfigError(format!("Invalid VOXEL_SERVER_PORT: {e}")))?;
        }

        if let Ok(name) = std::env::var("VOXEL_SERVER_NAME") {
            config.server.server_name = name;
        }

        if let Ok(motd) = std::env::var("VOXEL_SERVER_MOTD") {
            config.server.server_motd = motd;
        }

        if let Ok(players) = std::env::var("VOXEL_MAX_PLAYERS") {
            if let Ok(val) = players.parse::<u8>() {
                config.server.max_players = val;
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.world.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }

    /// Address the acceptor binds to
    pub fn bind_address(&self) -> Result<SocketAddr> {
        let ip = self.server.server_ip.parse::<IpAddr>().map_err(|e| {
            ProtocolError::ConfigError(format!(
                "Invalid server-ip '{}': {e}",
                self.server.server_ip
            ))
        })?;
        Ok(SocketAddr::new(ip, self.server.server_port))
    }
}

impl ConfigLookup for ServerConfig {
    fn get_str(&self, key: &str) -> Option<String> {
        match key {
            "server-ip" => Some(self.server.server_ip.clone()),
            "server-name" => Some(self.server.server_name.clone()),
            "server-motd" => Some(self.server.server_motd.clone()),
            "main-world" => Some(self.world.main_world.clone()),
            _ => None,
        }
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match key {
            "always-local-op" => Some(self.server.always_local_op),
            "console" => Some(self.server.console),
            "websocket" => Some(self.server.websocket),
            _ => None,
        }
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        match key {
            "server-port" => Some(i64::from(self.server.server_port)),
            "max-players" => Some(i64::from(self.server.max_players)),
            "max-connections-per-ip" => Some(i64::from(self.server.max_connections_per_ip)),
            _ => None,
        }
    }
}

/// Listener, identity and connection limits
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ListenerConfig {
    /// Bind address; "0.0.0.0" binds every adapter
    pub server_ip: String,

    pub server_port: u16,

    /// Shown to players while the map loads
    pub server_name: String,

    pub server_motd: String,

    /// Loopback clients become operators
    pub always_local_op: bool,

    /// Player slots [1-127]
    pub max_players: u8,

    /// Concurrent connections from one address [1-5]
    pub max_connections_per_ip: u8,

    /// Sleep between ticks
    #[serde(with = "duration_serde")]
    pub tick_interval: Duration,

    /// Read commands from stdin
    pub console: bool,

    /// Accept browser clients that open with an HTTP upgrade
    pub websocket: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            server_ip: String::from("0.0.0.0"),
            server_port: DEFAULT_PORT,
            server_name: String::from("Server name"),
            server_motd: String::from("Server MOTD"),
            always_local_op: false,
            max_players: 10,
            max_connections_per_ip: MAX_CONNECTIONS_PER_IP_LIMIT,
            tick_interval: Duration::from_millis(10),
            console: true,
            websocket: true,
        }
    }
}

impl ListenerConfig {
    /// Validate listener configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.server_ip.parse::<IpAddr>().is_err() {
            errors.push(format!(
                "Invalid server-ip: '{}' (expected an IP address such as '0.0.0.0')",
                self.server_ip
            ));
        }

        if self.server_port == 0 {
            errors.push("server-port must be between 1 and 65535".to_string());
        }

        if self.server_name.is_empty() {
            errors.push("server-name cannot be empty".to_string());
        } else if self.server_name.chars().count() > 64 {
            errors.push("server-name too long (maximum: 64 characters)".to_string());
        }

        if self.server_motd.chars().count() > 64 {
            errors.push("server-motd too long (maximum: 64 characters)".to_string());
        }

        if self.max_players == 0 || self.max_players > MAX_PLAYERS_LIMIT {
            errors.push(format!(
                "max-players out of range: {} (valid range: 1-{MAX_PLAYERS_LIMIT})",
                self.max_players
            ));
        }

        if self.max_connections_per_ip == 0
            || self.max_connections_per_ip > MAX_CONNECTIONS_PER_IP_LIMIT
        {
            errors.push(format!(
                "max-connections-per-ip out of range: {} (valid range: 1-{MAX_CONNECTIONS_PER_IP_LIMIT})",
                self.max_connections_per_ip
            ));
        }

        if self.tick_interval.is_zero() {
            errors.push("tick-interval must be greater than 0".to_string());
        } else if self.tick_interval > Duration::from_secs(1) {
            errors.push("tick-interval too long (maximum: 1s)".to_string());
        }

        errors
    }
}

/// Main world settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WorldConfig {
    pub main_world: String,
    pub width: u16,
    pub height: u16,
    pub length: u16,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            main_world: String::from("world"),
            width: 256,
            height: 256,
            length: 256,
        }
    }
}

impl WorldConfig {
    /// Validate world configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.main_world.is_empty() {
            errors.push("main-world cannot be empty".to_string());
        }

        for (axis, value) in [
            ("width", self.width),
            ("height", self.height),
            ("length", self.length),
        ] {
            if value == 0 {
                errors.push(format!("World {axis} must be greater than 0"));
            } else if value > 32767 {
                errors.push(format!("World {axis} too large: {value} (maximum: 32767)"));
            }
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("voxel-server"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}

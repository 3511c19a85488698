//! Service configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use wayfind_core::EngineConfig;

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Discovery engine tunables.
    pub discovery: DiscoveryConfig,
    /// Place query service settings.
    pub overpass: OverpassConfig,
    /// Discovery side effects.
    pub effects: EffectsConfig,
}

impl Config {
    /// Load configuration from the default path, or defaults if it does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// # Example
    ///
    /// ```
    /// use wayfind_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.discovery.validate());
        errors.extend(self.overpass.validate());
        errors.extend(self.effects.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Engine tunables derived from the `[discovery]` section.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            move_threshold_m: self.discovery.move_threshold_m,
            query_radius_m: self.discovery.query_radius_m,
            trigger_radius_m: self.discovery.trigger_radius_m,
            loiter_delay_ms: self.discovery.loiter_delay_ms,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8787").
    pub bind: String,
    /// Capacity of the engine event channel feeding WebSocket clients.
    pub broadcast_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            broadcast_buffer: DEFAULT_BROADCAST_BUFFER,
        }
    }
}

/// Default engine event channel capacity.
pub const DEFAULT_BROADCAST_BUFFER: usize = 100;

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
        } else {
            match self.bind.rsplit_once(':') {
                None => errors.push(ValidationError::new(
                    "server.bind",
                    format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                )),
                Some((_, port)) => match port.parse::<u16>() {
                    Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                    Err(_) => errors.push(ValidationError::new(
                        "server.bind",
                        format!("invalid port '{}': must be a number 1-65535", port),
                    )),
                    Ok(_) => {}
                },
            }
        }

        if self.broadcast_buffer == 0 {
            errors.push(ValidationError::new(
                "server.broadcast_buffer",
                "broadcast buffer must be at least 1",
            ));
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: wayfind_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }

        errors
    }
}

/// Maximum place query radius in meters.
pub const MAX_QUERY_RADIUS_M: u32 = 100_000;
/// Maximum loitering delay (24 hours).
pub const MAX_LOITER_DELAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Discovery engine tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Movement in meters before a new place query.
    pub move_threshold_m: f64,
    /// Radius of each place query in meters.
    pub query_radius_m: u32,
    /// Radius of each proximity trigger in meters.
    pub trigger_radius_m: f64,
    /// Loitering delay before a trigger's first event is honored.
    pub loiter_delay_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            move_threshold_m: engine.move_threshold_m,
            query_radius_m: engine.query_radius_m,
            trigger_radius_m: engine.trigger_radius_m,
            loiter_delay_ms: engine.loiter_delay_ms,
        }
    }
}

impl DiscoveryConfig {
    /// Validate discovery configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !(self.move_threshold_m.is_finite() && self.move_threshold_m > 0.0) {
            errors.push(ValidationError::new(
                "discovery.move_threshold_m",
                format!(
                    "move threshold {} must be a positive number of meters",
                    self.move_threshold_m
                ),
            ));
        }

        if !(1..=MAX_QUERY_RADIUS_M).contains(&self.query_radius_m) {
            errors.push(ValidationError::new(
                "discovery.query_radius_m",
                format!(
                    "query radius {} is out of range (1-{} meters)",
                    self.query_radius_m, MAX_QUERY_RADIUS_M
                ),
            ));
        }

        if !(self.trigger_radius_m.is_finite() && self.trigger_radius_m > 0.0) {
            errors.push(ValidationError::new(
                "discovery.trigger_radius_m",
                format!(
                    "trigger radius {} must be a positive number of meters",
                    self.trigger_radius_m
                ),
            ));
        }

        if self.loiter_delay_ms > MAX_LOITER_DELAY_MS {
            errors.push(ValidationError::new(
                "discovery.loiter_delay_ms",
                format!(
                    "loiter delay {} ms is too long (maximum {} ms / 24 hours)",
                    self.loiter_delay_ms, MAX_LOITER_DELAY_MS
                ),
            ));
        }

        errors
    }
}

/// Minimum Overpass request timeout in seconds.
pub const MIN_QUERY_TIMEOUT: u64 = 1;
/// Maximum Overpass request timeout in seconds (5 minutes).
pub const MAX_QUERY_TIMEOUT: u64 = 300;

/// Overpass API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverpassConfig {
    /// Interpreter endpoint URL.
    pub endpoint: String,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// `place=*` values to query.
    pub place_kinds: Vec<String>,
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            endpoint: wayfind_core::overpass::DEFAULT_ENDPOINT.to_string(),
            timeout_secs: wayfind_core::overpass::DEFAULT_TIMEOUT.as_secs(),
            place_kinds: wayfind_core::overpass::DEFAULT_PLACE_KINDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl OverpassConfig {
    /// Validate Overpass configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            errors.push(ValidationError::new(
                "overpass.endpoint",
                format!(
                    "endpoint '{}' must start with http:// or https://",
                    self.endpoint
                ),
            ));
        }

        if self.timeout_secs < MIN_QUERY_TIMEOUT {
            errors.push(ValidationError::new(
                "overpass.timeout_secs",
                format!(
                    "timeout {} is too short (minimum {} second)",
                    self.timeout_secs, MIN_QUERY_TIMEOUT
                ),
            ));
        } else if self.timeout_secs > MAX_QUERY_TIMEOUT {
            errors.push(ValidationError::new(
                "overpass.timeout_secs",
                format!(
                    "timeout {} is too long (maximum {} seconds)",
                    self.timeout_secs, MAX_QUERY_TIMEOUT
                ),
            ));
        }

        if self.place_kinds.is_empty() {
            errors.push(ValidationError::new(
                "overpass.place_kinds",
                "at least one place kind is required",
            ));
        }
        for (i, kind) in self.place_kinds.iter().enumerate() {
            if kind.trim().is_empty() || kind.contains(['"', '|']) {
                errors.push(ValidationError::new(
                    format!("overpass.place_kinds[{}]", i),
                    format!("invalid place kind '{}'", kind),
                ));
            }
        }

        errors
    }
}

/// Discovery side effect configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    /// Show a desktop notification for each new discovery.
    pub notifications: bool,
    /// Custom sound played for each new discovery.
    pub sound_path: Option<PathBuf>,
    /// Command used to play the sound file.
    pub sound_player: String,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            notifications: true,
            sound_path: None,
            sound_player: "paplay".to_string(),
        }
    }
}

impl EffectsConfig {
    /// Validate effects configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(path) = &self.sound_path
            && path.as_os_str().is_empty()
        {
            errors.push(ValidationError::new(
                "effects.sound_path",
                "sound path cannot be empty (omit it instead)",
            ));
        }

        if self.sound_path.is_some() && self.sound_player.trim().is_empty() {
            errors.push(ValidationError::new(
                "effects.sound_player",
                "a sound player is required when sound_path is set",
            ));
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `overpass.place_kinds[0]`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wayfind")
        .join("service.toml")
}

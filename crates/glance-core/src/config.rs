use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Environment variable that overrides `weather.base_url`.
pub const BASE_URL_ENV: &str = "GLANCE_WEATHER_URL";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a single-line summary of all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Remote endpoint and refresh policy
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Snapshot cache storage
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Base URL of the weather endpoint; requests go to `<base_url>/api`
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,

    /// How long an explicitly saved coordinate stays authoritative
    #[serde(default = "default_fix_validity_minutes")]
    pub fix_validity_minutes: u32,

    /// Age after which a fresh snapshot is labelled stale
    #[serde(default = "default_staleness_seconds")]
    pub staleness_seconds: u64,

    /// Periodic refresh interval in minutes (0 disables the periodic trigger)
    #[serde(default = "default_refresh_minutes")]
    pub refresh_minutes: u32,

    /// Shown when the upstream has no quip
    #[serde(default = "default_product_name")]
    pub product_name: String,
}

fn default_timeout_secs() -> u64 {
    4
}

fn default_fix_validity_minutes() -> u32 {
    15
}

fn default_staleness_seconds() -> u64 {
    120
}

fn default_refresh_minutes() -> u32 {
    30
}

fn default_product_name() -> String {
    "Empowering Weather".to_string()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://weather.oreostack.uk".to_string(),
            connect_timeout_secs: default_timeout_secs(),
            read_timeout_secs: default_timeout_secs(),
            fix_validity_minutes: default_fix_validity_minutes(),
            staleness_seconds: default_staleness_seconds(),
            refresh_minutes: default_refresh_minutes(),
            product_name: default_product_name(),
        }
    }
}

/// Which storage backend holds the snapshot cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// File name of the SQLite store, relative to `config_dir`
    #[serde(default = "default_cache_file_name")]
    pub file_name: String,
}

fn default_cache_file_name() -> String {
    "widget_cache.sqlite3".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            file_name: default_cache_file_name(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("glance");

        Self {
            config_dir,
            weather: WeatherConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist.
    ///
    /// # Errors
    /// Fails when the file exists but cannot be read or parsed, or when the
    /// default file cannot be written.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, creating defaults if missing.
    ///
    /// # Errors
    /// Same as [`Config::load`].
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let contents =
                std::fs::read_to_string(config_path).context("Failed to read config file")?;
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?
        } else {
            let config = Self::default();
            config.save_to(config_path)?;
            config
        };

        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            tracing::info!("Using weather base URL from {}", BASE_URL_ENV);
            config.weather.base_url = url;
        }

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    ///
    /// # Errors
    /// Returns an error if loading fails or validation reports errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        Self::load_validated_from(&Self::config_path()?)
    }

    /// [`Config::load_validated`] for an explicit path.
    ///
    /// # Errors
    /// Same as [`Config::load_validated`].
    pub fn load_validated_from(config_path: &Path) -> Result<(Self, ValidationResult)> {
        let config = Self::load_from(config_path)?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.weather.base_url, "weather.base_url", &mut result);

        if self.weather.connect_timeout_secs == 0 {
            result.add_error(
                "weather.connect_timeout_secs",
                "Connect timeout must be greater than 0",
            );
        }
        if self.weather.read_timeout_secs == 0 {
            result.add_error(
                "weather.read_timeout_secs",
                "Read timeout must be greater than 0",
            );
        }

        if self.weather.refresh_minutes == 0 {
            result.add_warning(
                "weather.refresh_minutes",
                "Periodic refresh disabled (0 minutes)",
            );
        } else if self.weather.refresh_minutes > 1440 {
            result.add_warning(
                "weather.refresh_minutes",
                "Refresh interval is more than 24 hours",
            );
        }

        if self.weather.staleness_seconds > u64::from(self.weather.fix_validity_minutes) * 60 {
            result.add_warning(
                "weather.staleness_seconds",
                "Staleness threshold is longer than the fix validity window",
            );
        }

        if self.weather.product_name.trim().is_empty() {
            result.add_warning("weather.product_name", "Product name is empty");
        }

        if self.cache.backend == CacheBackend::Sqlite && self.cache.file_name.trim().is_empty() {
            result.add_error("cache.file_name", "SQLite cache needs a file name");
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if url.port() == Some(0) {
                    result.add_error(field_name, "Port cannot be 0");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Path of the SQLite cache file
    pub fn cache_path(&self) -> PathBuf {
        self.config_dir.join(&self.cache.file_name)
    }

    /// Save configuration to the default location
    ///
    /// # Errors
    /// Fails when the directory cannot be created or the file cannot be written.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("glance");

        Ok(config_dir.join("config.toml"))
    }
}

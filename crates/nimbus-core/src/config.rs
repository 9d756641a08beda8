use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// WeatherAPI.com limits forecasts to this many days.
pub const MAX_FORECAST_DAYS: u8 = 14;

/// Search queries shorter than this never reach the cache or the network.
pub const MIN_QUERY_LENGTH: usize = 2;

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

    /// Get a user-friendly message summarizing all errors
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

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Remote weather API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Local cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Location search settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Forecast settings
    #[serde(default)]
    pub forecast: ForecastConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the WeatherAPI.com v1 endpoints
    pub base_url: String,

    /// API key (falls back to the WEATHER_API_KEY environment variable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.weatherapi.com/v1".to_string(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    /// Key from config, or from the environment when the config leaves it empty.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("WEATHER_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// SQLite database holding cached locations and forecasts
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nimbus")
        .join("weather.db")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Queries shorter than this never reach the cache or the network
    #[serde(default = "default_min_query_length")]
    pub min_query_length: usize,
}

fn default_min_query_length() -> usize {
    MIN_QUERY_LENGTH
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_query_length: default_min_query_length(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Number of forecast days requested
    #[serde(default = "default_forecast_days")]
    pub days: u8,
}

fn default_forecast_days() -> u8 {
    3
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            days: default_forecast_days(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing defaults there if the file is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.api.base_url, "api.base_url", &mut result);

        if self.api.timeout_secs == 0 {
            result.add_error("api.timeout_secs", "Timeout must be greater than 0");
        } else if self.api.timeout_secs > 120 {
            result.add_warning("api.timeout_secs", "Timeout is unusually long (>120s)");
        }

        if self.api.resolved_api_key().is_none() {
            result.add_warning(
                "api.api_key",
                "No API key configured - remote lookups will be rejected",
            );
        }

        if self.search.min_query_length < MIN_QUERY_LENGTH {
            result.add_error(
                "search.min_query_length",
                format!("Minimum query length must be at least {}", MIN_QUERY_LENGTH),
            );
        }

        if self.forecast.days == 0 || self.forecast.days > MAX_FORECAST_DAYS {
            result.add_error(
                "forecast.days",
                format!("Forecast days must be between 1 and {}", MAX_FORECAST_DAYS),
            );
        }

        if self.cache.path.as_os_str().is_empty() {
            result.add_error("cache.path", "Cache path cannot be empty");
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
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("nimbus");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_invalid_url() {
        let mut config = Config::default();
        config.api.base_url = "not-a-url".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "api.base_url"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.api.base_url = "ftp://api.weatherapi.com/v1".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = Config::default();
        config.api.timeout_secs = 0;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "api.timeout_secs"));
    }

    #[test]
    fn test_forecast_days_out_of_range() {
        let mut config = Config::default();
        config.forecast.days = MAX_FORECAST_DAYS + 1;
        assert!(!config.validate().is_valid());

        config.forecast.days = 0;
        assert!(!config.validate().is_valid());
    }

    #[test]
    fn test_min_query_length_below_two_is_rejected() {
        let mut config = Config::default();
        for too_short in [0, 1] {
            config.search.min_query_length = too_short;
            let result = config.validate();
            assert!(!result.is_valid());
            assert!(result
                .errors
                .iter()
                .any(|e| e.field == "search.min_query_length"));
        }

        config.search.min_query_length = 4;
        assert!(config.validate().is_valid());
    }

    #[test]
    fn test_missing_api_key_is_warning() {
        let mut config = Config::default();
        config.api.api_key = Some(String::new());
        let result = config.validate();
        assert!(result.is_valid());
        if std::env::var("WEATHER_API_KEY").is_err() {
            assert!(result.warnings.iter().any(|w| w.field == "api.api_key"));
        }
    }

    #[test]
    fn test_load_from_creates_defaults_then_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.search.min_query_length, 2);
        assert_eq!(created.forecast.days, 3);

        let mut edited = created.clone();
        edited.forecast.days = 7;
        edited.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.forecast.days, 7);
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[forecast]\ndays = 5\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.forecast.days, 5);
        assert_eq!(config.search.min_query_length, 2);
        assert_eq!(config.api.timeout_secs, 10);
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));

        assert_eq!(ValidationResult::default().error_summary(), "");
    }
}

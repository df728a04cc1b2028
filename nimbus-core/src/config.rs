use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf, time::Duration};

use crate::model::Units;

const DEFAULT_GEOCODING_URL: &str = "http://api.openweathermap.org/geo/1.0/direct";
const DEFAULT_CURRENT_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const DEFAULT_CLIMATE_URL: &str = "https://pro.openweathermap.org/data/2.5/forecast/climate";
const DEFAULT_HOURLY_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";

/// Pipeline configuration, supplied at construction and never re-read per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: String,

    pub geocoding_url: String,
    pub current_weather_url: String,
    pub climate_forecast_url: String,
    pub hourly_forecast_url: String,

    pub units: Units,

    /// Country code appended to geocoding queries, e.g. "US".
    pub default_country: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Attempt budget per HTTP call (initial attempt included).
    pub max_retries: u32,

    /// Exponential backoff table in seconds; clamped to the last value when
    /// attempts outrun it.
    pub retry_delays_secs: Vec<f64>,

    /// Fixed cooldown after an HTTP 429, in seconds.
    pub rate_limit_cooldown_secs: f64,

    /// Minimum spacing between outbound requests to one provider, in seconds.
    pub min_request_interval_secs: f64,

    /// How old a stored record may be and still satisfy a fetch, in seconds.
    pub cache_max_age_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            geocoding_url: DEFAULT_GEOCODING_URL.to_string(),
            current_weather_url: DEFAULT_CURRENT_URL.to_string(),
            climate_forecast_url: DEFAULT_CLIMATE_URL.to_string(),
            hourly_forecast_url: DEFAULT_HOURLY_URL.to_string(),
            units: Units::Imperial,
            default_country: "US".to_string(),
            request_timeout_secs: 10,
            max_retries: 3,
            retry_delays_secs: vec![1.0, 2.0, 4.0],
            rate_limit_cooldown_secs: 60.0,
            min_request_interval_secs: 1.0,
            cache_max_age_secs: 600,
        }
    }
}

impl Config {
    /// Build a config for the given API key with every other field defaulted.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), ..Self::default() }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delays(&self) -> Vec<Duration> {
        self.retry_delays_secs.iter().map(|&s| Duration::from_secs_f64(s)).collect()
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.rate_limit_cooldown_secs)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_secs_f64(self.min_request_interval_secs)
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(anyhow!("API key cannot be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("Request timeout must be positive"));
        }
        if self.max_retries < 1 {
            return Err(anyhow!("Max retries must be at least 1"));
        }
        if self.min_request_interval_secs < 0.0 {
            return Err(anyhow!("Min request interval cannot be negative"));
        }
        if self.retry_delays_secs.is_empty() {
            return Err(anyhow!("Retry delay table cannot be empty"));
        }
        Ok(())
    }

    /// Build a config from environment variables. The API key is looked up
    /// under several names for compatibility with older deployments.
    pub fn from_env() -> Result<Self> {
        let api_key = ["API_KEY", "WEATHER_API_KEY", "OPENWEATHER_API_KEY"]
            .iter()
            .find_map(|name| env::var(name).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                anyhow!(
                    "Weather API key is required. Set one of:\n\
                     \x20 - API_KEY\n\
                     \x20 - WEATHER_API_KEY\n\
                     \x20 - OPENWEATHER_API_KEY"
                )
            })?;

        let mut cfg = Self { api_key, ..Self::default() };

        if let Ok(units) = env::var("UNITS") {
            cfg.units = Units::try_from(units.as_str())?;
        }
        if let Ok(country) = env::var("DEFAULT_COUNTRY") {
            cfg.default_country = country;
        }
        if let Ok(timeout) = env::var("REQUEST_TIMEOUT") {
            cfg.request_timeout_secs =
                timeout.parse().context("Invalid REQUEST_TIMEOUT value")?;
        }
        if let Ok(retries) = env::var("MAX_RETRIES") {
            cfg.max_retries = retries.parse().context("Invalid MAX_RETRIES value")?;
        }
        if let Ok(interval) = env::var("MIN_REQUEST_INTERVAL") {
            cfg.min_request_interval_secs =
                interval.parse().context("Invalid MIN_REQUEST_INTERVAL value")?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Load config from disk, or return the defaults if no file exists yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "nimbus", "nimbus")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

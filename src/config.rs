//! Runtime configuration.
//!
//! Settings come from an optional TOML file and are then overlaid with
//! environment variables. Every section has defaults, so a missing or empty
//! file yields a usable configuration.

use crate::economics::EconomicParameters;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_DATABASE: &str = "CHART_HARVESTER_DATABASE";
pub const ENV_LOG_LEVEL: &str = "CHART_HARVESTER_LOG_LEVEL";
pub const ENV_MAX_CONCURRENCY: &str = "CHART_HARVESTER_MAX_CONCURRENCY";

/// Errors raised while loading configuration or wiring the registry.
///
/// All of these are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Duplicate platform registration: '{0}'")]
    DuplicatePlatform(String),

    #[error("Platform '{platform}' is missing required field '{field}'")]
    MissingField {
        platform: String,
        field: &'static str,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("No collectors are registered")]
    EmptyRegistry,

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_path: PathBuf,
    pub log_level: String,
    pub harvest: HarvestSettings,
    pub streams: StreamEstimate,
    pub economics: EconomicParameters,
    pub platforms: BTreeMap<String, PlatformSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/harvest.db"),
            log_level: "info".to_string(),
            harvest: HarvestSettings::default(),
            streams: StreamEstimate::default(),
            economics: EconomicParameters::default(),
            platforms: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestSettings {
    pub limit: usize,
    pub per_platform_timeout_secs: u64,
    pub max_concurrency: usize,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            limit: 20,
            per_platform_timeout_secs: 30,
            max_concurrency: 4,
            request_timeout_secs: 10,
            user_agent: concat!("chart-harvester/", env!("CARGO_PKG_VERSION")).to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl HarvestSettings {
    pub fn per_platform_timeout(&self) -> Duration {
        Duration::from_secs(self.per_platform_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Backoff applied to transient failures inside a single tier.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff_ms: 250,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let ms = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(ms.max(0.0) as u64)
    }
}

/// Rank-based stream estimate used when a source reports no play counts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamEstimate {
    pub base_streams: u64,
    pub decay_span: u32,
    pub floor: u64,
}

impl Default for StreamEstimate {
    fn default() -> Self {
        Self {
            base_streams: 2_500_000,
            decay_span: 120,
            floor: 1_000,
        }
    }
}

impl StreamEstimate {
    pub fn for_rank(&self, rank: u32) -> u64 {
        let span = self.decay_span.max(1) as f64;
        let position = rank.saturating_sub(1) as f64;
        let estimate = self.base_streams as f64 * (1.0 - position / span);
        (estimate.max(0.0) as u64).max(self.floor)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    pub enabled: Option<bool>,
    pub rate_limit_per_minute: Option<u32>,
    pub requires_authentication: Option<bool>,
    pub api_key: Option<String>,
}

/// Per-platform secrets, injected into collectors at construction.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    api_keys: HashMap<String, String>,
}

impl Credentials {
    pub fn with_api_key(mut self, platform: &str, key: impl Into<String>) -> Self {
        self.api_keys.insert(platform.to_string(), key.into());
        self
    }

    pub fn api_key(&self, platform: &str) -> Option<&str> {
        self.api_keys
            .get(platform)
            .map(String::as_str)
            .filter(|k| !k.trim().is_empty())
    }
}

/// Environment variable carrying a platform's API key, e.g.
/// `apple-music` -> `APPLE_MUSIC_API_KEY`.
pub fn api_key_env_var(platform: &str) -> String {
    format!("{}_API_KEY", platform.to_uppercase().replace('-', "_"))
}

impl Settings {
    /// Loads settings from `path` (if given) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut settings = match path {
            Some(path) => {
                let content =
                    std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        settings.apply_env(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigurationError> {
        Ok(toml::from_str(content)?)
    }

    /// Overlays environment values obtained through `lookup`.
    ///
    /// API keys are looked up for every known platform plus any platform
    /// named in the file.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DATABASE) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(raw) = lookup(ENV_MAX_CONCURRENCY) {
            let parsed = raw.trim().parse().map_err(|_| ConfigurationError::InvalidValue {
                field: ENV_MAX_CONCURRENCY.to_string(),
                reason: format!("'{}' is not a positive integer", raw),
            })?;
            self.harvest.max_concurrency = parsed;
        }

        let mut platforms: Vec<String> = crate::harvest::collectors::PLATFORM_IDS
            .iter()
            .map(|id| id.to_string())
            .collect();
        platforms.extend(self.platforms.keys().cloned());
        platforms.sort();
        platforms.dedup();

        for platform in platforms {
            if let Some(key) = lookup(&api_key_env_var(&platform)) {
                self.platforms.entry(platform).or_default().api_key = Some(key);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let positive = |field: &str, ok: bool, reason: &str| {
            if ok {
                Ok(())
            } else {
                Err(ConfigurationError::InvalidValue {
                    field: field.to_string(),
                    reason: reason.to_string(),
                })
            }
        };
        positive("harvest.limit", self.harvest.limit > 0, "must be at least 1")?;
        positive(
            "harvest.max_concurrency",
            self.harvest.max_concurrency > 0,
            "must be at least 1",
        )?;
        positive(
            "harvest.per_platform_timeout_secs",
            self.harvest.per_platform_timeout_secs > 0,
            "must be at least 1",
        )?;
        positive(
            "harvest.retry.max_attempts",
            self.harvest.retry.max_attempts > 0,
            "must be at least 1",
        )?;
        for (id, platform) in &self.platforms {
            if platform.rate_limit_per_minute == Some(0) {
                return Err(ConfigurationError::InvalidValue {
                    field: format!("platforms.{}.rate_limit_per_minute", id),
                    reason: "must be positive".to_string(),
                });
            }
        }
        self.economics.validate()
    }

    pub fn platform(&self, id: &str) -> Option<&PlatformSettings> {
        self.platforms.get(id)
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.platform(id).and_then(|p| p.enabled).unwrap_or(true)
    }

    pub fn credentials(&self) -> Credentials {
        self.platforms
            .iter()
            .filter_map(|(id, p)| p.api_key.as_ref().map(|key| (id, key)))
            .fold(Credentials::default(), |creds, (id, key)| {
                creds.with_api_key(id, key.clone())
            })
    }
}

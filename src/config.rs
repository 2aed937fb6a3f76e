//! Job configuration
//!
//! Loaded from a YAML file (`SyncConfig::from_file`) or from the
//! environment (`SyncConfig::from_env`). Both paths validate the feed URLs.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_REGIONS_URL: &str = "https://improvement.nhs.uk/regions.json/";
pub const DEFAULT_ORGANISATIONS_URL: &str = "https://improvement.nhs.uk/organisations.json";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DATABASE_URL: &str = "postgresql://localhost:5432/orgsync";
const DEFAULT_POOL_SIZE: u32 = 5;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Root configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub feeds: FeedConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Upstream feed endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_regions_url")]
    pub regions_url: String,
    #[serde(default = "default_organisations_url")]
    pub organisations_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

/// Database connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_regions_url() -> String {
    DEFAULT_REGIONS_URL.to_string()
}

fn default_organisations_url() -> String {
    DEFAULT_ORGANISATIONS_URL.to_string()
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

fn default_acquire_timeout_secs() -> u64 {
    DEFAULT_ACQUIRE_TIMEOUT_SECS
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            regions_url: default_regions_url(),
            organisations_url: default_organisations_url(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_pool_size(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl FeedConfig {
    pub fn regions_url(&self) -> Result<Url, ConfigError> {
        parse_url("feeds.regions_url", &self.regions_url)
    }

    pub fn organisations_url(&self) -> Result<Url, ConfigError> {
        parse_url("feeds.organisations_url", &self.organisations_url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl SyncConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from environment variables, with defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let feeds = FeedConfig {
            regions_url: lookup("ORGSYNC_REGIONS_URL").unwrap_or_else(default_regions_url),
            organisations_url: lookup("ORGSYNC_ORGANISATIONS_URL")
                .unwrap_or_else(default_organisations_url),
            timeout_secs: parse_var(
                "ORGSYNC_HTTP_TIMEOUT_SECS",
                lookup("ORGSYNC_HTTP_TIMEOUT_SECS"),
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?,
        };

        let database = DatabaseConfig {
            url: lookup("DATABASE_URL").unwrap_or_else(default_database_url),
            max_connections: parse_var(
                "DATABASE_POOL_SIZE",
                lookup("DATABASE_POOL_SIZE"),
                DEFAULT_POOL_SIZE,
            )?,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        };

        let config = SyncConfig { feeds, database };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.feeds.regions_url()?;
        self.feeds.organisations_url()?;
        Ok(())
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl { field, source })
}

fn parse_var<T: std::str::FromStr>(
    var: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
    }
}

/// Mask the password of a database URL for logging
pub fn mask_database_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) if parsed.password().is_some() => {
            let mut masked = parsed.clone();
            let _ = masked.set_password(Some("***"));
            masked.to_string()
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => "<unparseable database url>".to_string(),
    }
}

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::models::DiscoveryFilters;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub quota: QuotaSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub offers: OfferSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
    pub auth: AuthSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// `memory` runs against the in-process store
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

impl DatabaseSettings {
    pub fn is_memory(&self) -> bool {
        self.url == "memory"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_profile_ttl_secs")]
    pub profile_ttl_secs: u64,
    #[serde(default = "default_profile_capacity")]
    pub profile_capacity: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            profile_ttl_secs: default_profile_ttl_secs(),
            profile_capacity: default_profile_capacity(),
        }
    }
}

fn default_profile_ttl_secs() -> u64 { 60 }
fn default_profile_capacity() -> u64 { 10_000 }

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// Without a Redis URL skip sets live in process memory
    pub redis_url: Option<String>,
    #[serde(default = "default_skip_ttl_secs")]
    pub skip_ttl_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            skip_ttl_secs: default_skip_ttl_secs(),
        }
    }
}

fn default_skip_ttl_secs() -> u64 { 3600 }

/// Request allowance policy
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QuotaSettings {
    #[serde(default = "default_free_offers_limit")]
    pub free_offers_limit: u32,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            free_offers_limit: default_free_offers_limit(),
        }
    }
}

fn default_free_offers_limit() -> u32 { 3 }

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverySettings {
    #[serde(default = "default_min_age")]
    pub default_min_age: u8,
    #[serde(default = "default_max_age")]
    pub default_max_age: u8,
    #[serde(default = "default_max_distance_km")]
    pub default_max_distance_km: Option<f64>,
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            default_min_age: default_min_age(),
            default_max_age: default_max_age(),
            default_max_distance_km: default_max_distance_km(),
            candidate_limit: default_candidate_limit(),
        }
    }
}

impl DiscoverySettings {
    pub fn default_filters(&self) -> DiscoveryFilters {
        DiscoveryFilters {
            min_age: self.default_min_age,
            max_age: self.default_max_age,
            gender: None,
            max_distance_km: self.default_max_distance_km,
        }
    }
}

fn default_min_age() -> u8 { 18 }
fn default_max_age() -> u8 { 99 }
fn default_max_distance_km() -> Option<f64> { Some(50.0) }
fn default_candidate_limit() -> usize { 500 }

#[derive(Debug, Clone, Deserialize)]
pub struct OfferSettings {
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// Run the expiry sweep in-process at this interval; unset leaves it to an external job
    pub sweep_interval_secs: Option<u64>,
}

impl Default for OfferSettings {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            sweep_interval_secs: None,
        }
    }
}

fn default_daily_limit() -> u32 { 5 }

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    /// Without a webhook, notification events are only logged
    pub webhook_url: Option<String>,
    #[serde(default = "default_notification_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_notification_timeout_secs(),
        }
    }
}

fn default_notification_timeout_secs() -> u64 { 10 }

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Environment variables (prefixed with LUME_)
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            // Local development overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., LUME__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("LUME")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings = apply_env_overrides(settings)?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("LUME")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

/// Well-known variables that take precedence over the prefixed ones
fn apply_env_overrides(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let mut builder = Config::builder().add_source(settings);

    if let Ok(database_url) = env::var("DATABASE_URL") {
        builder = builder.set_override("database.url", database_url)?;
    }
    if let Ok(redis_url) = env::var("REDIS_URL") {
        builder = builder.set_override("session.redis_url", redis_url)?;
    }
    if let Ok(secret) = env::var("JWT_SECRET") {
        builder = builder.set_override("auth.jwt_secret", secret)?;
    }

    builder.build()
}

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use dotenv::dotenv;
use std::{env, fmt, str::FromStr, time::Duration};

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    Development,
    Production,
    Testing,
}

impl FromStr for AppEnvironment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" => Ok(AppEnvironment::Development),
            "production" => Ok(AppEnvironment::Production),
            "testing" => Ok(AppEnvironment::Testing),
            _ => Err(ConfigError::Message(format!("Invalid environment: {}", s))),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// Upstream provider and resolver tuning.
#[derive(Deserialize, Clone)]
#[serde(rename_all = "snake_case")]
pub struct ApodSettings {
    #[serde(default = "default_apod_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_backfill_timeout")]
    pub backfill_timeout_secs: u64,

    #[serde(default = "default_minimum_listing")]
    pub minimum_listing: usize,

    #[serde(default = "default_backfill_window")]
    pub backfill_window_days: u32,

    #[serde(default = "default_max_backfill")]
    pub max_backfill_days: u32,

    #[serde(default = "default_refresh_enabled")]
    pub refresh_enabled: bool,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_mins: u64,
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    #[serde(default = "default_env")]
    pub env: AppEnvironment,

    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    #[serde(default = "default_storage")]
    pub storage: StorageBackend,

    #[serde(default)]
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: Vec<String>,

    #[serde(default)]
    pub admin_api_key: Option<String>,

    #[serde(default)]
    pub apod: ApodSettings,
}

fn default_env() -> AppEnvironment {
    AppEnvironment::Development
}
fn default_name() -> String {
    "CosmoView-API".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_worker_count() -> usize {
    num_cpus::get()
}
fn default_storage() -> StorageBackend {
    StorageBackend::Postgres
}
fn default_max_connections() -> u32 {
    10
}
fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_apod_base_url() -> String {
    "https://api.nasa.gov/planetary".to_string()
}
fn default_fetch_timeout() -> u64 {
    20
}
fn default_backfill_timeout() -> u64 {
    5
}
fn default_minimum_listing() -> usize {
    5
}
fn default_backfill_window() -> u32 {
    3
}
fn default_max_backfill() -> u32 {
    31
}
fn default_refresh_enabled() -> bool {
    true
}
fn default_refresh_interval() -> u64 {
    360
}

/// One week.
pub const MAX_REFRESH_INTERVAL_MINS: u64 = 7 * 24 * 60;

impl Default for ApodSettings {
    fn default() -> Self {
        ApodSettings {
            base_url: default_apod_base_url(),
            api_key: String::new(),
            fetch_timeout_secs: default_fetch_timeout(),
            backfill_timeout_secs: default_backfill_timeout(),
            minimum_listing: default_minimum_listing(),
            backfill_window_days: default_backfill_window(),
            max_backfill_days: default_max_backfill(),
            refresh_enabled: default_refresh_enabled(),
            refresh_interval_mins: default_refresh_interval(),
        }
    }
}

impl ApodSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn backfill_timeout(&self) -> Duration {
        Duration::from_secs(self.backfill_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_mins.saturating_mul(60))
    }
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let env_name = AppEnvironment::detect()?;

        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env_name)).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors_allowed_origins")
                    .try_parsing(true)
                    .ignore_empty(true)
            );

        let mut config: Self = builder.build()?.try_deserialize()?;

        config.env = env_name;

        // NASA_API_KEY is the name the mobile backend has always used
        if config.apod.api_key.trim().is_empty() {
            config.apod.api_key = env::var("NASA_API_KEY").unwrap_or_default();
        }
        if config.storage == StorageBackend::Postgres {
            config.database_url = fill_or_env(config.database_url, "DATABASE_URL")?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.storage == StorageBackend::Postgres && self.database_url.trim().is_empty() {
            errors.push("DATABASE_URL cannot be empty");
        }
        if self.is_production() && self.storage == StorageBackend::Memory {
            errors.push("In-memory storage is not allowed in production");
        }
        if self.admin_api_key.as_ref().is_some_and(|key| key.len() < 32) {
            errors.push("ADMIN_API_KEY must be at least 32 characters");
        }
        if self.is_production() && self.cors_origins().iter().any(|o| o == "*") {
            errors.push("Wildcard CORS (*) is not allowed in production");
        }
        match url::Url::parse(&self.apod.base_url) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
            _ => errors.push("APOD base_url must be an http(s) URL"),
        }
        if self.apod.fetch_timeout_secs == 0 || self.apod.backfill_timeout_secs == 0 {
            errors.push("APOD timeouts must be positive");
        }
        if self.apod.max_backfill_days == 0 {
            errors.push("APOD max_backfill_days must be positive");
        }
        if self.apod.refresh_enabled
            && !(1..=MAX_REFRESH_INTERVAL_MINS).contains(&self.apod.refresh_interval_mins)
        {
            errors.push("APOD refresh_interval_mins must be between 1 and 10080");
        }
        if self.database_max_connections == 0 {
            errors.push("database_max_connections must be positive");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Message(errors.join(", ")))
        }
    }

    pub fn is_production(&self) -> bool {
        self.env == AppEnvironment::Production
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .iter()
            .flat_map(|origin| origin.split(','))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn fill_or_env(current: String, env_key: &str) -> Result<String, ConfigError> {
    if current.trim().is_empty() {
        env::var(env_key).map_err(|_| ConfigError::Message(format!("{env_key} must be set")))
    } else {
        Ok(current)
    }
}

impl AppEnvironment {
    /// Reads `APP_ENV`, loading `.env` first so values defined only there
    /// are seen before logging is configured.
    pub fn detect() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_raw(env::var("APP_ENV").ok().as_deref())
    }

    fn from_raw(raw: Option<&str>) -> Result<Self, ConfigError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(AppEnvironment::Development),
            Some(raw) => AppEnvironment::from_str(raw)
                .map_err(|_| ConfigError::Message(format!("Invalid APP_ENV value: {}", raw))),
        }
    }
}

impl fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppEnvironment::Development => "development",
            AppEnvironment::Production => "production",
            AppEnvironment::Testing => "testing",
        };
        write!(f, "{s}")
    }
}

trait Redact {
    fn redact(&self) -> &str;
}

impl Redact for str {
    fn redact(&self) -> &str {
        if self.is_empty() {
            "[MISSING]"
        } else {
            "[REDACTED]"
        }
    }
}

impl Redact for String {
    fn redact(&self) -> &str {
        self.as_str().redact()
    }
}

impl fmt::Debug for ApodSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApodSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.redact())
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("backfill_timeout_secs", &self.backfill_timeout_secs)
            .field("minimum_listing", &self.minimum_listing)
            .field("backfill_window_days", &self.backfill_window_days)
            .field("max_backfill_days", &self.max_backfill_days)
            .field("refresh_enabled", &self.refresh_enabled)
            .field("refresh_interval_mins", &self.refresh_interval_mins)
            .finish()
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("name", &self.name)
            .field("port", &self.port)
            .field("host", &self.host)
            .field("worker_count", &self.worker_count)
            .field("storage", &self.storage)
            .field("database_url", &self.database_url.redact())
            .field("database_max_connections", &self.database_max_connections)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("admin_api_key", &self.admin_api_key.as_deref().map(str::redact))
            .field("apod", &self.apod)
            .finish()
    }
}

//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SWCACHE_*)
//! 2. TOML config file (if SWCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheNames, ResourceClass};

mod validation;

pub use validation::ConfigError;

const DAY_SECS: u64 = 24 * 60 * 60;

/// Deployment environment; selects the expiry tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

/// Per-class entry ceilings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheLimits {
    pub static_entries: usize,
    pub image_entries: usize,
    pub api_entries: usize,
    pub runtime_entries: usize,
    pub page_entries: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self { static_entries: 100, image_entries: 60, api_entries: 50, runtime_entries: 30, page_entries: 50 }
    }
}

impl CacheLimits {
    pub fn for_class(&self, class: ResourceClass) -> usize {
        match class {
            ResourceClass::Static => self.static_entries,
            ResourceClass::Image => self.image_entries,
            ResourceClass::Api => self.api_entries,
            ResourceClass::Runtime => self.runtime_entries,
            ResourceClass::Page => self.page_entries,
        }
    }
}

/// Max-age thresholds in seconds.
///
/// Development keeps long lifetimes; production shortens static assets to the
/// critical-resource max-age so rebuilds reach users quickly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    pub static_secs: u64,
    pub critical_secs: u64,
    pub api_secs: u64,
    pub api_critical_secs: u64,
    pub media_secs: u64,
    pub page_secs: u64,
    pub page_production_secs: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            static_secs: 30 * DAY_SECS,
            critical_secs: 5 * 60,
            api_secs: 10 * 60,
            api_critical_secs: 60,
            media_secs: 30 * DAY_SECS,
            page_secs: DAY_SECS,
            page_production_secs: 60 * 60,
        }
    }
}

/// Retry policy for queued mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { max_retries: 3, base_delay_ms: 1_000, backoff_multiplier: 2.0, max_delay_ms: 30_000 }
    }
}

impl SyncConfig {
    /// Delay before the retry that follows failure number `retry_count`.
    ///
    /// `min(base * multiplier^(retry_count - 1), max)`.
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1) as i32;
        let delay = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.max_delay_ms as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SWCACHE_*, nested keys split on `__`)
/// 2. TOML config file (if SWCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding stores and the sync queue.
    ///
    /// Set via SWCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// The origin this engine fronts; relative request paths resolve against it.
    #[serde(default = "default_origin")]
    pub origin: String,

    #[serde(default)]
    pub environment: Environment,

    /// Semantic version embedded in every store name.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Build identifier embedded in the static store name.
    ///
    /// Set via SWCACHE_BUILD_ID at deploy time.
    #[serde(default = "default_build_id")]
    pub build_id: String,

    /// Path prefix of the build's hashed static assets.
    #[serde(default = "default_static_prefix")]
    pub static_prefix: String,

    #[serde(default = "default_offline_path")]
    pub offline_path: String,

    /// Critical assets pre-cached on install.
    #[serde(default = "default_static_assets")]
    pub static_assets: Vec<String>,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub limits: CacheLimits,

    #[serde(default)]
    pub expiry: ExpiryConfig,

    /// Responses larger than this are never admitted to the image store.
    #[serde(default = "default_image_max_bytes")]
    pub image_max_bytes: u64,

    /// Total storage usage that triggers aggressive trimming.
    #[serde(default = "default_storage_ceiling_bytes")]
    pub storage_ceiling_bytes: u64,

    /// Minimum time between full cleanups.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// How often the host re-runs the maintenance check.
    #[serde(default = "default_maintenance_tick_secs")]
    pub maintenance_tick_secs: u64,

    #[serde(default)]
    pub sync: SyncConfig,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./swcache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_cache_version() -> String {
    "v1.0.0".into()
}

fn default_build_id() -> String {
    "dev".into()
}

fn default_static_prefix() -> String {
    "/_next/static/".into()
}

fn default_offline_path() -> String {
    "/offline".into()
}

fn default_static_assets() -> Vec<String> {
    ["/", "/offline", "/manifest.json", "/icons/icon-192x192.png", "/icons/icon-512x512.png"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_user_agent() -> String {
    "swcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_image_max_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_storage_ceiling_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_cleanup_interval_secs() -> u64 {
    DAY_SECS
}

fn default_maintenance_tick_secs() -> u64 {
    60 * 60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            environment: Environment::default(),
            cache_version: default_cache_version(),
            build_id: default_build_id(),
            static_prefix: default_static_prefix(),
            offline_path: default_offline_path(),
            static_assets: default_static_assets(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            limits: CacheLimits::default(),
            expiry: ExpiryConfig::default(),
            image_max_bytes: default_image_max_bytes(),
            storage_ceiling_bytes: default_storage_ceiling_bytes(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            maintenance_tick_secs: default_maintenance_tick_secs(),
            sync: SyncConfig::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn maintenance_tick(&self) -> Duration {
        Duration::from_secs(self.maintenance_tick_secs)
    }

    /// Store names for this version and build.
    pub fn cache_names(&self) -> CacheNames {
        CacheNames::new(&self.cache_version, &self.build_id)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SWCACHE_`
    /// 2. TOML file from `SWCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SWCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SWCACHE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./swcache.sqlite"));
        assert_eq!(config.origin, "http://localhost:3000");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.cache_version, "v1.0.0");
        assert_eq!(config.static_prefix, "/_next/static/");
        assert_eq!(config.image_max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.storage_ceiling_bytes, 100 * 1024 * 1024);
        assert_eq!(config.cleanup_interval(), Duration::from_secs(86_400));
        assert_eq!(config.sync.max_retries, 3);
        assert!(config.static_assets.contains(&"/offline".to_string()));
    }

    #[test]
    fn test_limits_for_class() {
        let limits = CacheLimits::default();
        assert_eq!(limits.for_class(ResourceClass::Api), 50);
        assert_eq!(limits.for_class(ResourceClass::Static), 100);
    }

    #[test]
    fn test_retry_delay_backoff_and_ceiling() {
        let sync = SyncConfig { base_delay_ms: 1_000, backoff_multiplier: 2.0, max_delay_ms: 5_000, max_retries: 10 };
        assert_eq!(sync.retry_delay(1), Duration::from_millis(1_000));
        assert_eq!(sync.retry_delay(2), Duration::from_millis(2_000));
        assert_eq!(sync.retry_delay(3), Duration::from_millis(4_000));
        assert_eq!(sync.retry_delay(4), Duration::from_millis(5_000));
        assert_eq!(sync.retry_delay(9), Duration::from_millis(5_000));
    }

    #[test]
    fn test_cache_names_from_config() {
        let config = AppConfig { build_id: "b42".into(), ..Default::default() };
        let names = config.cache_names();
        assert_eq!(names.name_for(ResourceClass::Static), "static-cache-v1.0.0-b42");
    }

    #[test]
    fn test_environment_serde() {
        let env: Environment = serde_json::from_str("\"development\"").unwrap();
        assert_eq!(env, Environment::Development);
    }
}

//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::cache::ResourceClass;
use crate::config::{AppConfig, Environment};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an absolute http(s) URL
    /// - `cache_version` or `user_agent` is empty
    /// - a static asset or route path does not start with `/`
    /// - any per-class entry ceiling is 0
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `image_max_bytes` is 0
    /// - the sync retry policy is inconsistent
    /// - `maintenance_tick_secs` or `cleanup_interval_secs` is 0
    ///
    /// Returns `ConfigError::Missing` if `build_id` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let origin = url::Url::parse(&self.origin).map_err(|e| invalid("origin", &e.to_string()))?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(invalid("origin", "must use http or https"));
        }

        if self.cache_version.is_empty() {
            return Err(invalid("cache_version", "must not be empty"));
        }
        if self.build_id.is_empty() {
            return Err(ConfigError::Missing {
                field: "build_id".into(),
                hint: "Set SWCACHE_BUILD_ID to the deployment's build identifier".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if !self.static_prefix.starts_with('/') {
            return Err(invalid("static_prefix", "must start with '/'"));
        }
        if !self.offline_path.starts_with('/') {
            return Err(invalid("offline_path", "must start with '/'"));
        }
        if let Some(asset) = self.static_assets.iter().find(|asset| !asset.starts_with('/')) {
            return Err(ConfigError::Invalid {
                field: "static_assets".into(),
                reason: format!("'{asset}' must start with '/'"),
            });
        }

        for class in ResourceClass::ALL {
            if self.limits.for_class(class) == 0 {
                return Err(ConfigError::Invalid {
                    field: format!("limits.{class}_entries"),
                    reason: "must be greater than 0".into(),
                });
            }
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.image_max_bytes == 0 {
            return Err(invalid("image_max_bytes", "must be greater than 0"));
        }

        if self.sync.max_retries == 0 {
            return Err(invalid("sync.max_retries", "must be at least 1"));
        }
        if self.sync.backoff_multiplier < 1.0 {
            return Err(invalid("sync.backoff_multiplier", "must be at least 1.0"));
        }
        if self.sync.base_delay_ms > self.sync.max_delay_ms {
            return Err(invalid("sync.base_delay_ms", "must not exceed sync.max_delay_ms"));
        }

        if self.maintenance_tick_secs == 0 {
            return Err(invalid("maintenance_tick_secs", "must be greater than 0"));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(invalid("cleanup_interval_secs", "must be greater than 0"));
        }

        if self.environment == Environment::Development && self.build_id != "dev" {
            tracing::warn!(
                build_id = %self.build_id,
                "development environment with a release build id; \
                 static assets will use the long development max-age"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_origin() {
        let config = AppConfig { origin: "not a url".into(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "origin"));

        let config = AppConfig { origin: "ftp://example.com".into(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "origin"));
    }

    #[test]
    fn test_validate_empty_build_id() {
        let config = AppConfig { build_id: String::new(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Missing { field, .. }) if field == "build_id"));
    }

    #[test]
    fn test_validate_relative_static_asset() {
        let config = AppConfig { static_assets: vec!["offline".into()], ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "static_assets"));
    }

    #[test]
    fn test_validate_zero_ceiling() {
        let mut config = AppConfig::default();
        config.limits.api_entries = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "limits.api_entries"));
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let config = AppConfig { timeout_ms: 50, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));

        let config = AppConfig { timeout_ms: 301_000, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_sync_policy() {
        let mut config = AppConfig::default();
        config.sync.max_retries = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "sync.max_retries"));

        let mut config = AppConfig::default();
        config.sync.backoff_multiplier = 0.5;
        assert!(
            matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "sync.backoff_multiplier")
        );

        let mut config = AppConfig::default();
        config.sync.base_delay_ms = 60_000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "sync.base_delay_ms"));
    }

    #[test]
    fn test_validate_zero_tick() {
        let config = AppConfig { maintenance_tick_secs: 0, ..Default::default() };
        assert!(
            matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "maintenance_tick_secs")
        );

        let config = AppConfig { cleanup_interval_secs: 0, ..Default::default() };
        assert!(
            matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "cleanup_interval_secs")
        );
    }

    #[test]
    fn test_validate_development_with_release_build_warns_only() {
        let config =
            AppConfig { environment: Environment::Development, build_id: "release-7".into(), ..Default::default() };
        assert!(config.validate().is_ok());
    }
}

//! Freshness of stored responses.
//!
//! Staleness is always recomputed from the stored `Date` header and the wall
//! clock; it is never persisted.

use chrono::{DateTime, Duration, Utc};
use swcache_core::config::{Environment, ExpiryConfig};
use swcache_core::{AppConfig, ResourceClass, StoredResponse};

/// Two-tier (development/production) max-age policy.
#[derive(Debug, Clone)]
pub struct ExpiryPolicy {
    expiry: ExpiryConfig,
    environment: Environment,
}

impl ExpiryPolicy {
    pub fn new(expiry: ExpiryConfig, environment: Environment) -> Self {
        Self { expiry, environment }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.expiry.clone(), config.environment)
    }

    /// Maximum age for a class in the configured environment.
    pub fn max_age(&self, class: ResourceClass) -> Duration {
        let production = self.environment == Environment::Production;
        let secs = match class {
            ResourceClass::Static if production => self.expiry.critical_secs,
            ResourceClass::Static => self.expiry.static_secs,
            ResourceClass::Api if production => self.expiry.api_critical_secs,
            ResourceClass::Api => self.expiry.api_secs,
            ResourceClass::Image | ResourceClass::Runtime => self.expiry.media_secs,
            ResourceClass::Page if production => self.expiry.page_production_secs,
            ResourceClass::Page => self.expiry.page_secs,
        };
        // values past chrono's range mean "never expires"
        Duration::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX)).unwrap_or(Duration::MAX)
    }

    pub fn is_expired(&self, class: ResourceClass, stored: &StoredResponse) -> bool {
        self.is_expired_at(class, stored, Utc::now())
    }

    /// A response without a parseable `Date` is never expired.
    pub fn is_expired_at(&self, class: ResourceClass, stored: &StoredResponse, now: DateTime<Utc>) -> bool {
        match stored.date() {
            Some(date) => now - date > self.max_age(class),
            None => false,
        }
    }
}

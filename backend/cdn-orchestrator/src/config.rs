/// Configuration for cdn-orchestrator
///
/// Read from `CDN_`-prefixed environment variables (after loading `.env`).
/// Every field has a default so an empty environment yields a working setup.
use crate::error::{CdnError, Result};
use crate::models::ProviderDefinition;
use crate::services::analytics::AnalyticsConfig;
use crate::services::distribution::DistributionConfig;
use crate::services::health_monitor::HealthMonitorConfig;
use serde::Deserialize;
use std::time::Duration;

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_redundancy_factor() -> usize {
    3
}
fn default_health_check_interval_secs() -> u64 {
    30
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_cooldown_secs() -> u64 {
    60
}
fn default_degraded_error_threshold() -> u32 {
    3
}
fn default_uptime_window() -> usize {
    100
}
fn default_upload_timeout_secs() -> u64 {
    30
}
fn default_purge_timeout_secs() -> u64 {
    15
}
fn default_probe_timeout_secs() -> u64 {
    8
}
fn default_url_cache_ttl_secs() -> u64 {
    300
}
fn default_cache_capacity() -> u64 {
    10_000
}
fn default_geo_cache_ttl_secs() -> u64 {
    3600
}
fn default_analytics_cache_ttl_secs() -> u64 {
    60
}
fn default_analytics_interval_secs() -> u64 {
    86_400
}
fn default_cold_after_days() -> i64 {
    30
}
fn default_delete_after_days() -> i64 {
    90
}
fn default_cold_request_threshold() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_redundancy_factor")]
    pub redundancy_factor: usize,

    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_degraded_error_threshold")]
    pub degraded_error_threshold: u32,
    #[serde(default = "default_uptime_window")]
    pub uptime_window: usize,

    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
    #[serde(default = "default_purge_timeout_secs")]
    pub purge_timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_url_cache_ttl_secs")]
    pub url_cache_ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub url_cache_capacity: u64,
    #[serde(default = "default_geo_cache_ttl_secs")]
    pub geo_cache_ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub geo_cache_capacity: u64,

    #[serde(default = "default_analytics_cache_ttl_secs")]
    pub analytics_cache_ttl_secs: u64,
    #[serde(default = "default_analytics_interval_secs")]
    pub analytics_interval_secs: u64,
    #[serde(default = "default_cold_after_days")]
    pub cold_after_days: i64,
    #[serde(default = "default_delete_after_days")]
    pub delete_after_days: i64,
    #[serde(default = "default_cold_request_threshold")]
    pub cold_request_threshold: u64,

    /// Base URL of the IP geolocation service; geo routing is off when unset
    #[serde(default)]
    pub geolocation_url: Option<String>,
    /// JSON file with an array of provider definitions registered at start-up
    #[serde(default)]
    pub providers_file: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            redundancy_factor: default_redundancy_factor(),
            health_check_interval_secs: default_health_check_interval_secs(),
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
            degraded_error_threshold: default_degraded_error_threshold(),
            uptime_window: default_uptime_window(),
            upload_timeout_secs: default_upload_timeout_secs(),
            purge_timeout_secs: default_purge_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            url_cache_ttl_secs: default_url_cache_ttl_secs(),
            url_cache_capacity: default_cache_capacity(),
            geo_cache_ttl_secs: default_geo_cache_ttl_secs(),
            geo_cache_capacity: default_cache_capacity(),
            analytics_cache_ttl_secs: default_analytics_cache_ttl_secs(),
            analytics_interval_secs: default_analytics_interval_secs(),
            cold_after_days: default_cold_after_days(),
            delete_after_days: default_delete_after_days(),
            cold_request_threshold: default_cold_request_threshold(),
            geolocation_url: None,
            providers_file: None,
        }
    }
}

impl Settings {
    /// Load `.env` (if present) and read `CDN_*` variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let settings: Settings = envy::prefixed("CDN_")
            .from_env()
            .map_err(|e| CdnError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Build from unprefixed lowercase key/value pairs
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let settings: Settings =
            envy::from_iter(pairs).map_err(|e| CdnError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.redundancy_factor == 0 {
            return Err(CdnError::Config("redundancy_factor must be at least 1".into()));
        }
        if self.failure_threshold == 0 {
            return Err(CdnError::Config("failure_threshold must be at least 1".into()));
        }
        if self.uptime_window == 0 {
            return Err(CdnError::Config("uptime_window must be at least 1".into()));
        }
        if self.delete_after_days < self.cold_after_days {
            return Err(CdnError::Config(
                "delete_after_days must not be below cold_after_days".into(),
            ));
        }
        Ok(())
    }

    pub fn health_monitor_config(&self) -> HealthMonitorConfig {
        HealthMonitorConfig {
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_secs(self.cooldown_secs),
            degraded_error_threshold: self.degraded_error_threshold,
            uptime_window: self.uptime_window,
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            interval: Duration::from_secs(self.health_check_interval_secs),
        }
    }

    pub fn distribution_config(&self) -> DistributionConfig {
        DistributionConfig {
            redundancy_factor: self.redundancy_factor,
            upload_timeout: Duration::from_secs(self.upload_timeout_secs),
        }
    }

    pub fn purge_timeout(&self) -> Duration {
        Duration::from_secs(self.purge_timeout_secs)
    }

    pub fn analytics_config(&self) -> AnalyticsConfig {
        AnalyticsConfig {
            cache_ttl: Duration::from_secs(self.analytics_cache_ttl_secs),
            interval: Duration::from_secs(self.analytics_interval_secs),
            cold_after_days: self.cold_after_days,
            delete_after_days: self.delete_after_days,
            cold_request_threshold: self.cold_request_threshold,
        }
    }

    /// Provider definitions from `providers_file`; empty when unset
    pub fn load_providers(&self) -> Result<Vec<ProviderDefinition>> {
        let Some(path) = &self.providers_file else {
            return Ok(Vec::new());
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CdnError::Config(format!("Failed to read {}: {}", path, e)))?;
        parse_providers(&raw)
    }
}

pub fn parse_providers(raw: &str) -> Result<Vec<ProviderDefinition>> {
    serde_json::from_str(raw)
        .map_err(|e| CdnError::Config(format!("Invalid provider definitions: {}", e)))
}

/// Geolocation lookup with a bounded TTL cache in front of the resolver.
///
/// Lookups never fail: resolver errors and non-routable addresses degrade to
/// an unknown location so routing falls back to non-geographic rules.
use crate::error::{CdnError, Result};
use crate::models::GeoLocation;
use async_trait::async_trait;
use moka::future::Cache;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait GeolocationResolver: Send + Sync {
    async fn resolve(&self, ip: IpAddr) -> Result<GeoLocation>;
}

#[derive(Debug, Deserialize)]
struct ResolverResponse {
    #[serde(default, alias = "country_code", alias = "countryCode")]
    country: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default, alias = "latitude")]
    lat: Option<f64>,
    #[serde(default, alias = "longitude")]
    lon: Option<f64>,
    #[serde(default)]
    timezone: Option<String>,
}

/// Resolver backed by an HTTP lookup service answering `GET {base}/{ip}`
pub struct HttpGeolocationResolver {
    base_url: String,
    http: reqwest::Client,
}

impl HttpGeolocationResolver {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CdnError::Config(format!("Failed to build geolocation client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl GeolocationResolver for HttpGeolocationResolver {
    async fn resolve(&self, ip: IpAddr) -> Result<GeoLocation> {
        let url = format!("{}/{}", self.base_url, ip);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CdnError::GeolocationUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CdnError::GeolocationUnavailable(format!(
                "resolver returned {}",
                response.status()
            )));
        }

        let body: ResolverResponse = response
            .json()
            .await
            .map_err(|e| CdnError::GeolocationUnavailable(e.to_string()))?;

        Ok(GeoLocation {
            country: body.country.map(|c| c.to_uppercase()),
            region: body.region,
            city: body.city,
            lat: body.lat,
            lon: body.lon,
            timezone: body.timezone,
        })
    }
}

fn is_routable(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => !(v6.is_loopback() || v6.is_unspecified()),
    }
}

pub struct GeolocationCache {
    resolver: Option<Arc<dyn GeolocationResolver>>,
    cache: Cache<IpAddr, GeoLocation>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl GeolocationCache {
    pub fn new(
        resolver: Option<Arc<dyn GeolocationResolver>>,
        capacity: u64,
        ttl: Duration,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self {
            resolver,
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Resolve a client IP string; never fails
    pub async fn lookup(&self, client_ip: &str) -> GeoLocation {
        let Ok(ip) = client_ip.trim().parse::<IpAddr>() else {
            debug!(client_ip, "Unparseable client IP; location unknown");
            return GeoLocation::unknown();
        };
        if !is_routable(&ip) {
            return GeoLocation::unknown();
        }
        let Some(resolver) = &self.resolver else {
            return GeoLocation::unknown();
        };

        if let Some(cached) = self.cache.get(&ip).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return cached;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let location = match resolver.resolve(ip).await {
            Ok(location) => location,
            Err(e) => {
                warn!(%ip, error = %e, "Geolocation lookup failed");
                GeoLocation::unknown()
            }
        };

        // Unknown results are cached too so a failing resolver is not hammered
        self.cache.insert(ip, location.clone()).await;
        location
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

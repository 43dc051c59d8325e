/// Routing Engine
///
/// Picks the provider that serves a read and builds its delivery URL.
/// Rules are tried in order and the first match wins:
/// preferred provider, nearest region, best health score, then any cached
/// copy regardless of health.
use crate::error::{CdnError, Result};
use crate::metrics;
use crate::models::geo::nearest_region_distance_km;
use crate::models::{DistributedFile, GeoLocation, ProviderDefinition, ProviderPlacement};
use crate::services::file_store::FileStore;
use crate::services::geolocation::GeolocationCache;
use crate::services::health_monitor::HealthMonitor;
use crate::services::registry::ProviderRegistry;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Latency at or above which the latency half of the score contributes nothing
pub const LATENCY_CEILING_MS: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Auto,
    Avif,
    Webp,
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Avif => "avif",
            Self::Webp => "webp",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }

    /// Concrete format for `auto` from an `Accept` header; jpeg when unknown
    pub fn from_accept(accept: Option<&str>) -> Self {
        let accept = accept.unwrap_or_default().to_ascii_lowercase();
        if accept.contains("image/avif") {
            Self::Avif
        } else if accept.contains("image/webp") {
            Self::Webp
        } else {
            Self::Jpeg
        }
    }
}

impl std::str::FromStr for ImageFormat {
    type Err = CdnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "avif" => Ok(Self::Avif),
            "webp" => Ok(Self::Webp),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            other => Err(CdnError::Validation(format!("Unknown image format: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropMode {
    Fill,
    Fit,
    Crop,
    Scale,
    Pad,
}

impl CropMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fill => "fill",
            Self::Fit => "fit",
            Self::Crop => "crop",
            Self::Scale => "scale",
            Self::Pad => "pad",
        }
    }
}

impl std::str::FromStr for CropMode {
    type Err = CdnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fill" => Ok(Self::Fill),
            "fit" => Ok(Self::Fit),
            "crop" => Ok(Self::Crop),
            "scale" => Ok(Self::Scale),
            "pad" => Ok(Self::Pad),
            other => Err(CdnError::Validation(format!("Unknown crop mode: {}", other))),
        }
    }
}

/// Transformation options appended to the delivery URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlOptions {
    pub format: Option<ImageFormat>,
    pub quality: Option<u8>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub dpr: Option<f32>,
    pub crop: Option<CropMode>,
}

impl UrlOptions {
    pub fn validate(&self) -> Result<()> {
        if let Some(q) = self.quality {
            if !(1..=100).contains(&q) {
                return Err(CdnError::Validation("quality must be between 1 and 100".into()));
            }
        }
        if self.width == Some(0) || self.height == Some(0) {
            return Err(CdnError::Validation("dimensions must be positive".into()));
        }
        if let Some(dpr) = self.dpr {
            if !(dpr > 0.0 && dpr <= 5.0) {
                return Err(CdnError::Validation("dpr must be in (0, 5]".into()));
            }
        }
        Ok(())
    }

    fn query_pairs(&self, format: Option<ImageFormat>) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(f) = format {
            pairs.push(("format", f.as_str().to_string()));
        }
        if let Some(q) = self.quality {
            pairs.push(("quality", q.to_string()));
        }
        if let Some(w) = self.width {
            pairs.push(("width", w.to_string()));
        }
        if let Some(h) = self.height {
            pairs.push(("height", h.to_string()));
        }
        if let Some(d) = self.dpr {
            pairs.push(("dpr", d.to_string()));
        }
        if let Some(c) = self.crop {
            pairs.push(("crop", c.as_str().to_string()));
        }
        pairs
    }
}

/// Append transformation parameters to a placement URL
pub fn build_url(base: &str, options: &UrlOptions, format: Option<ImageFormat>) -> String {
    let pairs = options.query_pairs(format);
    if pairs.is_empty() {
        return base.to_string();
    }

    match url::Url::parse(base) {
        Ok(mut url) => {
            {
                let mut query = url.query_pairs_mut();
                for (k, v) in &pairs {
                    query.append_pair(k, v);
                }
            }
            url.to_string()
        }
        Err(_) => {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in &pairs {
                serializer.append_pair(k, v);
            }
            let separator = if base.contains('?') { '&' } else { '?' };
            format!("{}{}{}", base, separator, serializer.finish())
        }
    }
}

pub fn provider_score(uptime: f64, latency_ms: Option<u64>) -> f64 {
    let latency = latency_ms.map(|l| l as f64).unwrap_or(LATENCY_CEILING_MS);
    0.5 * uptime + 0.5 * (LATENCY_CEILING_MS - latency).max(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingRule {
    Preferred,
    Geographic,
    Score,
    Fallback,
}

impl RoutingRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preferred => "preferred",
            Self::Geographic => "geographic",
            Self::Score => "score",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub file_id: Uuid,
    /// Already-resolved requester location; takes precedence over `client_ip`
    pub location: Option<GeoLocation>,
    pub client_ip: Option<String>,
    pub options: UrlOptions,
    pub preferred_provider: Option<String>,
    /// `Accept` header used to resolve `format=auto`
    pub accept: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutedUrl {
    pub url: String,
    pub provider_id: String,
    pub rule: RoutingRule,
    /// Served from the URL cache
    pub cached: bool,
}

/// Built URLs keyed by file and option set. Dropped wholesale on purge.
pub struct UrlCache {
    cache: Cache<String, RoutedUrl>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl UrlCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    async fn get(&self, key: &str) -> Option<RoutedUrl> {
        self.cache.get(key).await
    }

    async fn insert(&self, key: String, value: RoutedUrl) {
        self.cache.insert(key, value).await;
    }

    async fn remove(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::record_url_cache_event("hit");
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_url_cache_event("miss");
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
        debug!("URL cache invalidated");
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

fn cache_key(
    file_id: &Uuid,
    options: &UrlOptions,
    format: Option<ImageFormat>,
    preferred: Option<&str>,
    location: Option<&GeoLocation>,
) -> String {
    let loc = match location {
        Some(l) => match (l.coordinates(), &l.country) {
            (Some(c), _) => format!("{:.0},{:.0}", c.lat, c.lon),
            (None, Some(country)) => country.clone(),
            (None, None) => "-".to_string(),
        },
        None => "-".to_string(),
    };
    let query = options
        .query_pairs(format)
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}|{}|{}|{}", file_id, query, preferred.unwrap_or("-"), loc)
}

pub struct RoutingEngine {
    registry: Arc<ProviderRegistry>,
    health: Arc<HealthMonitor>,
    files: Arc<FileStore>,
    geo: Arc<GeolocationCache>,
    url_cache: Arc<UrlCache>,
}

impl RoutingEngine {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        health: Arc<HealthMonitor>,
        files: Arc<FileStore>,
        geo: Arc<GeolocationCache>,
        url_cache: Arc<UrlCache>,
    ) -> Self {
        Self {
            registry,
            health,
            files,
            geo,
            url_cache,
        }
    }

    pub fn url_cache(&self) -> &Arc<UrlCache> {
        &self.url_cache
    }

    /// Resolve the delivery URL for a file. `Ok(None)` means no provider
    /// holds a cached copy.
    pub async fn route(&self, request: RouteRequest) -> Result<Option<RoutedUrl>> {
        request.options.validate()?;

        let file = self
            .files
            .get(&request.file_id)
            .ok_or_else(|| CdnError::FileNotFound(request.file_id.to_string()))?;

        let location = match request.location {
            Some(location) => Some(location),
            None => match request.client_ip.as_deref() {
                Some(ip) => Some(self.geo.lookup(ip).await),
                None => None,
            },
        }
        .filter(|l| !l.is_unknown());

        let format = match request.options.format {
            Some(ImageFormat::Auto) => Some(ImageFormat::from_accept(request.accept.as_deref())),
            other => other,
        };
        let country = location.as_ref().and_then(|l| l.country.clone());

        let key = cache_key(
            &file.id,
            &request.options,
            format,
            request.preferred_provider.as_deref(),
            location.as_ref(),
        );

        if let Some(hit) = self.url_cache.get(&key).await {
            if self.still_valid(&file, &hit) {
                self.url_cache.record_hit();
                self.record_access(&file.id, &hit.provider_id, country.as_deref());
                return Ok(Some(RoutedUrl { cached: true, ..hit }));
            }
            metrics::record_url_cache_event("stale");
            self.url_cache.remove(&key).await;
        }
        self.url_cache.record_miss();

        let Some((placement, rule)) = self.select(
            &file,
            request.preferred_provider.as_deref(),
            location.as_ref(),
        ) else {
            debug!(file_id = %file.id, "No cached placement to route to");
            return Ok(None);
        };

        let base = placement.url.as_deref().unwrap_or_default();
        let routed = RoutedUrl {
            url: build_url(base, &request.options, format),
            provider_id: placement.provider_id.clone(),
            rule,
            cached: false,
        };

        self.url_cache.insert(key, routed.clone()).await;
        self.record_access(&file.id, &routed.provider_id, country.as_deref());
        metrics::record_routing_decision(rule.as_str());
        debug!(
            file_id = %file.id,
            provider_id = %routed.provider_id,
            rule = rule.as_str(),
            "Routed request"
        );

        Ok(Some(routed))
    }

    fn usable(&self, provider_id: &str) -> Option<ProviderDefinition> {
        self.registry
            .get(provider_id)
            .filter(|d| d.enabled && self.health.is_healthy(provider_id))
    }

    /// Healthy enabled providers with a cached placement, best priority first
    fn healthy_placements<'a>(
        &self,
        file: &'a DistributedFile,
    ) -> Vec<(&'a ProviderPlacement, ProviderDefinition)> {
        let mut healthy: Vec<_> = file
            .cached_placements()
            .filter(|p| p.url.is_some())
            .filter_map(|p| self.usable(&p.provider_id).map(|d| (p, d)))
            .collect();
        healthy.sort_by(|a, b| {
            a.1.priority
                .cmp(&b.1.priority)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        healthy
    }

    fn select<'a>(
        &self,
        file: &'a DistributedFile,
        preferred: Option<&str>,
        location: Option<&GeoLocation>,
    ) -> Option<(&'a ProviderPlacement, RoutingRule)> {
        if let Some(preferred) = preferred {
            if let Some(placement) = file
                .cached_placement(preferred)
                .filter(|p| p.url.is_some())
            {
                if self.usable(preferred).is_some() {
                    return Some((placement, RoutingRule::Preferred));
                }
            }
        }

        let healthy = self.healthy_placements(file);

        if let Some(origin) = location.and_then(|l| l.coordinates()) {
            let nearest = healthy
                .iter()
                .filter_map(|(p, d)| {
                    nearest_region_distance_km(&origin, &d.regions).map(|km| (*p, km))
                })
                .min_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((placement, _)) = nearest {
                return Some((placement, RoutingRule::Geographic));
            }
        }

        let best = healthy
            .iter()
            .map(|(p, d)| {
                let score = self
                    .health
                    .snapshot(&d.id)
                    .map(|s| provider_score(s.uptime, s.latency_ms))
                    .unwrap_or(0.0);
                (*p, d, score)
            })
            .max_by(|a, b| {
                a.2.total_cmp(&b.2)
                    .then_with(|| b.1.priority.cmp(&a.1.priority))
                    .then_with(|| b.1.id.cmp(&a.1.id))
            });
        if let Some((placement, _, _)) = best {
            return Some((placement, RoutingRule::Score));
        }

        // Availability over optimality: any cached copy, enabled providers first
        file.cached_placements()
            .filter(|p| p.url.is_some())
            .map(|p| (p, self.registry.get(&p.provider_id)))
            .min_by(|a, b| {
                fallback_order(a.1.as_ref(), b.1.as_ref())
                    .then_with(|| a.0.provider_id.cmp(&b.0.provider_id))
            })
            .map(|(p, _)| (p, RoutingRule::Fallback))
    }

    fn still_valid(&self, file: &DistributedFile, hit: &RoutedUrl) -> bool {
        if file.cached_placement(&hit.provider_id).is_none() {
            return false;
        }
        match hit.rule {
            RoutingRule::Fallback => self.healthy_placements(file).is_empty(),
            _ => self.usable(&hit.provider_id).is_some(),
        }
    }

    fn record_access(&self, file_id: &Uuid, provider_id: &str, country: Option<&str>) {
        self.files.update(file_id, |f| {
            let size = f.size;
            f.analytics.record_request(provider_id, size, country);
        });
    }
}

fn fallback_order(a: Option<&ProviderDefinition>, b: Option<&ProviderDefinition>) -> CmpOrdering {
    let rank = |d: Option<&ProviderDefinition>| match d {
        Some(d) => (!d.enabled, d.priority),
        None => (true, u32::MAX),
    };
    rank(a).cmp(&rank(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_accept_header() {
        assert_eq!(
            ImageFormat::from_accept(Some("image/avif,image/webp,*/*")),
            ImageFormat::Avif
        );
        assert_eq!(
            ImageFormat::from_accept(Some("image/webp,image/*")),
            ImageFormat::Webp
        );
        assert_eq!(ImageFormat::from_accept(Some("*/*")), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_accept(None), ImageFormat::Jpeg);
    }

    #[test]
    fn test_build_url_appends_parameters_in_order() {
        let options = UrlOptions {
            quality: Some(80),
            width: Some(640),
            dpr: Some(2.0),
            crop: Some(CropMode::Fill),
            ..Default::default()
        };
        let url = build_url("https://cdn.example.com/a/b.jpg", &options, Some(ImageFormat::Webp));
        assert_eq!(
            url,
            "https://cdn.example.com/a/b.jpg?format=webp&quality=80&width=640&dpr=2&crop=fill"
        );
    }

    #[test]
    fn test_build_url_keeps_existing_query() {
        let options = UrlOptions {
            width: Some(100),
            ..Default::default()
        };
        let url = build_url("https://cdn.example.com/x.png?v=3", &options, None);
        assert_eq!(url, "https://cdn.example.com/x.png?v=3&width=100");
    }

    #[test]
    fn test_build_url_without_options_is_identity() {
        let base = "https://cdn.example.com/file.bin";
        assert_eq!(build_url(base, &UrlOptions::default(), None), base);
    }

    #[test]
    fn test_score_prefers_lower_latency_then_uptime() {
        let fast = provider_score(90.0, Some(50));
        let slow = provider_score(100.0, Some(400));
        assert!(fast > slow);
        assert_eq!(provider_score(100.0, None), 50.0);
        assert_eq!(provider_score(100.0, Some(5000)), 50.0);
    }

    #[test]
    fn test_options_validation() {
        assert!(UrlOptions::default().validate().is_ok());
        let bad_quality = UrlOptions {
            quality: Some(0),
            ..Default::default()
        };
        assert!(matches!(bad_quality.validate(), Err(CdnError::Validation(_))));
        let bad_dpr = UrlOptions {
            dpr: Some(9.0),
            ..Default::default()
        };
        assert!(bad_dpr.validate().is_err());
    }

    #[test]
    fn test_cache_key_distinguishes_options_and_location() {
        let id = Uuid::nil();
        let a = cache_key(&id, &UrlOptions::default(), None, None, None);
        let b = cache_key(
            &id,
            &UrlOptions {
                width: Some(10),
                ..Default::default()
            },
            None,
            None,
            None,
        );
        let tokyo = GeoLocation {
            lat: Some(35.7),
            lon: Some(139.7),
            ..Default::default()
        };
        let c = cache_key(&id, &UrlOptions::default(), None, None, Some(&tokyo));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_url_cache_hit_rate() {
        let cache = UrlCache::new(10, Duration::from_secs(60));
        assert_eq!(cache.hit_rate(), 0.0);
        cache.record_miss();
        cache.record_hit();
        cache.record_hit();
        cache.record_hit();
        assert_eq!(cache.hit_rate(), 0.75);
    }
}

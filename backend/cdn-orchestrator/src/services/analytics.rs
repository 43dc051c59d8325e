/// Analytics & Cost Optimizer
///
/// Aggregates the per-file counters maintained by routing into reports and
/// flags cold content. It only recommends; nothing here moves or deletes data.
use crate::error::{CdnError, Result};
use crate::models::{DistributedFile, Pricing};
use crate::services::file_store::FileStore;
use crate::services::registry::ProviderRegistry;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const TOP_N: usize = 10;
/// Share of the hot storage cost saved by moving a file to a cold tier
const COLD_TIER_SAVINGS_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Hour,
    #[default]
    Day,
    Week,
    Month,
    All,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::All => "all",
        }
    }

    /// Start of the window ending at `now`; `None` for an unbounded window
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let span = match self {
            Self::Hour => ChronoDuration::hours(1),
            Self::Day => ChronoDuration::days(1),
            Self::Week => ChronoDuration::weeks(1),
            Self::Month => ChronoDuration::days(30),
            Self::All => return None,
        };
        Some(now - span)
    }
}

impl std::str::FromStr for TimeRange {
    type Err = CdnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hour" | "1h" => Ok(Self::Hour),
            "day" | "24h" => Ok(Self::Day),
            "week" | "7d" => Ok(Self::Week),
            "month" | "30d" => Ok(Self::Month),
            "all" => Ok(Self::All),
            other => Err(CdnError::Validation(format!("Unknown time range: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderBreakdown {
    pub provider_id: String,
    pub requests: u64,
    pub bytes: u64,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountryCount {
    pub country: String,
    pub requests: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub file_id: Uuid,
    pub filename: String,
    pub requests: u64,
    pub bytes: u64,
}

/// Aggregate over files last accessed inside the window. Counters are the
/// files' lifetime totals.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub range: TimeRange,
    pub generated_at: DateTime<Utc>,
    pub total_files: usize,
    pub active_files: usize,
    pub total_requests: u64,
    pub total_bytes: u64,
    pub estimated_total_cost: f64,
    pub providers: Vec<ProviderBreakdown>,
    pub top_countries: Vec<CountryCount>,
    pub top_files: Vec<FileSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationAction {
    ColdTier,
    Delete,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub file_id: Uuid,
    pub filename: String,
    pub action: RecommendationAction,
    pub days_since_access: i64,
    pub total_requests: u64,
    pub estimated_monthly_savings: f64,
}

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub cache_ttl: Duration,
    pub interval: Duration,
    pub cold_after_days: i64,
    pub delete_after_days: i64,
    pub cold_request_threshold: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60),
            interval: Duration::from_secs(86_400),
            cold_after_days: 30,
            delete_after_days: 90,
            cold_request_threshold: 10,
        }
    }
}

/// `max(0, gb - free_quota) * cost_per_gb + requests * cost_per_request`
pub fn estimate_cost(pricing: &Pricing, bytes: u64, requests: u64) -> f64 {
    let gb = bytes as f64 / BYTES_PER_GB;
    (gb - pricing.free_quota_gb).max(0.0) * pricing.cost_per_gb
        + requests as f64 * pricing.cost_per_request
}

pub struct AnalyticsService {
    config: AnalyticsConfig,
    registry: Arc<ProviderRegistry>,
    files: Arc<FileStore>,
    reports: Cache<TimeRange, Arc<AnalyticsReport>>,
}

impl AnalyticsService {
    pub fn new(config: AnalyticsConfig, registry: Arc<ProviderRegistry>, files: Arc<FileStore>) -> Self {
        let reports = Cache::builder()
            .max_capacity(16)
            .time_to_live(config.cache_ttl)
            .build();
        Self {
            config,
            registry,
            files,
            reports,
        }
    }

    /// Report for `range`, served from the snapshot cache when fresh
    pub async fn report(&self, range: TimeRange) -> AnalyticsReport {
        let report = self
            .reports
            .get_with(range, async { Arc::new(self.compute(range, Utc::now())) })
            .await;
        (*report).clone()
    }

    pub fn invalidate(&self) {
        self.reports.invalidate_all();
    }

    fn compute(&self, range: TimeRange, now: DateTime<Utc>) -> AnalyticsReport {
        let since = range.since(now);
        let all = self.files.all();
        let total_files = all.len();
        let active: Vec<DistributedFile> = all
            .into_iter()
            .filter(|f| since.map_or(true, |s| f.analytics.last_accessed_at >= s))
            .collect();

        let mut per_provider: HashMap<String, (u64, u64)> = HashMap::new();
        let mut per_country: HashMap<String, u64> = HashMap::new();
        let mut total_requests = 0u64;
        let mut total_bytes = 0u64;

        for file in &active {
            total_requests = total_requests.saturating_add(file.analytics.total_requests);
            total_bytes = total_bytes.saturating_add(file.analytics.total_bytes);
            for (provider_id, usage) in &file.analytics.providers {
                let entry = per_provider.entry(provider_id.clone()).or_default();
                entry.0 = entry.0.saturating_add(usage.requests);
                entry.1 = entry.1.saturating_add(usage.bytes);
            }
            for (country, count) in &file.analytics.countries {
                *per_country.entry(country.clone()).or_default() += count;
            }
        }

        let mut providers: Vec<ProviderBreakdown> = per_provider
            .into_iter()
            .map(|(provider_id, (requests, bytes))| {
                let estimated_cost = self
                    .registry
                    .get(&provider_id)
                    .map(|d| estimate_cost(&d.pricing, bytes, requests))
                    .unwrap_or(0.0);
                ProviderBreakdown {
                    provider_id,
                    requests,
                    bytes,
                    estimated_cost,
                }
            })
            .collect();
        providers.sort_by(|a, b| {
            b.requests
                .cmp(&a.requests)
                .then_with(|| a.provider_id.cmp(&b.provider_id))
        });
        let estimated_total_cost: f64 = providers.iter().map(|p| p.estimated_cost).sum();

        let mut top_countries: Vec<CountryCount> = per_country
            .into_iter()
            .map(|(country, requests)| CountryCount { country, requests })
            .collect();
        top_countries.sort_by(|a, b| b.requests.cmp(&a.requests).then_with(|| a.country.cmp(&b.country)));
        top_countries.truncate(TOP_N);

        let mut top_files: Vec<FileSummary> = active
            .iter()
            .map(|f| FileSummary {
                file_id: f.id,
                filename: f.filename.clone(),
                requests: f.analytics.total_requests,
                bytes: f.analytics.total_bytes,
            })
            .collect();
        top_files.sort_by(|a, b| b.requests.cmp(&a.requests).then_with(|| a.file_id.cmp(&b.file_id)));
        top_files.truncate(TOP_N);

        debug!(range = range.as_str(), active = active.len(), "Analytics report computed");

        AnalyticsReport {
            range,
            generated_at: now,
            total_files,
            active_files: active.len(),
            total_requests,
            total_bytes,
            estimated_total_cost,
            providers,
            top_countries,
            top_files,
        }
    }

    pub fn cost_recommendations(&self) -> Vec<Recommendation> {
        self.recommendations_at(Utc::now())
    }

    fn recommendations_at(&self, now: DateTime<Utc>) -> Vec<Recommendation> {
        let mut recommendations: Vec<Recommendation> = self
            .files
            .all()
            .into_iter()
            .filter(DistributedFile::is_servable)
            .filter_map(|file| self.recommend(&file, now))
            .collect();

        recommendations.sort_by(|a, b| {
            b.estimated_monthly_savings
                .total_cmp(&a.estimated_monthly_savings)
                .then_with(|| a.file_id.cmp(&b.file_id))
        });
        recommendations
    }

    fn recommend(&self, file: &DistributedFile, now: DateTime<Utc>) -> Option<Recommendation> {
        let days = (now - file.analytics.last_accessed_at).num_days();
        let requests = file.analytics.total_requests;

        let action = if days >= self.config.delete_after_days {
            RecommendationAction::Delete
        } else if days >= self.config.cold_after_days && requests < self.config.cold_request_threshold {
            RecommendationAction::ColdTier
        } else {
            return None;
        };

        let size_gb = file.size as f64 / BYTES_PER_GB;
        let storage_cost: f64 = file
            .cached_placements()
            .filter_map(|p| self.registry.get(&p.provider_id))
            .map(|d| size_gb * d.pricing.cost_per_gb)
            .sum();
        let savings = match action {
            RecommendationAction::Delete => storage_cost,
            RecommendationAction::ColdTier => storage_cost * COLD_TIER_SAVINGS_RATIO,
        };

        Some(Recommendation {
            file_id: file.id,
            filename: file.filename.clone(),
            action,
            days_since_access: days,
            total_requests: requests,
            estimated_monthly_savings: savings,
        })
    }

    /// Recompute recommendations on the configured cadence until shutdown
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.config.interval;
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.invalidate();
                        let recommendations = self.cost_recommendations();
                        let savings: f64 = recommendations.iter().map(|r| r.estimated_monthly_savings).sum();
                        info!(
                            count = recommendations.len(),
                            estimated_monthly_savings = savings,
                            "Cost optimization pass complete"
                        );
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Analytics optimizer stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Capabilities, FileAnalytics, PlacementStatus, ProviderConfig, ProviderDefinition,
        ProviderPlacement, ProviderTimeouts,
    };
    use crate::providers::{ProviderClient, ProviderClientFactory};
    use std::collections::BTreeMap;

    struct NoClients;

    impl ProviderClientFactory for NoClients {
        fn build(&self, d: &ProviderDefinition) -> Result<Arc<dyn ProviderClient>> {
            Err(CdnError::Config(format!("no client for {}", d.id)))
        }
    }

    fn registry_with_pricing(cost_per_gb: f64) -> Arc<ProviderRegistry> {
        let registry = Arc::new(ProviderRegistry::new(Arc::new(NoClients)));
        registry
            .register_provider(ProviderDefinition {
                id: "p".into(),
                name: "P".into(),
                config: ProviderConfig::Generic {
                    endpoint: "https://p.example.com".into(),
                    api_key: None,
                    delivery_base: None,
                },
                enabled: false,
                priority: 1,
                regions: vec![],
                capabilities: Capabilities::default(),
                pricing: Pricing {
                    cost_per_gb,
                    cost_per_request: 0.0,
                    free_quota_gb: 0.0,
                },
                timeouts: ProviderTimeouts::default(),
            })
            .unwrap();
        registry
    }

    fn file(size: u64, days_idle: i64, requests: u64) -> DistributedFile {
        let now = Utc::now();
        let mut placement = ProviderPlacement::uploading("p", size);
        placement.status = PlacementStatus::Cached;
        placement.url = Some("https://p.example.com/f".into());
        let mut analytics = FileAnalytics::new(now - ChronoDuration::days(days_idle));
        analytics.total_requests = requests;
        DistributedFile {
            id: Uuid::new_v4(),
            content_hash: Uuid::new_v4().to_string(),
            filename: "f.bin".into(),
            mime_type: "application/octet-stream".into(),
            size,
            owner_id: "u".into(),
            created_at: now,
            updated_at: now,
            access_count: 1,
            regions: vec![],
            tags: vec![],
            placements: BTreeMap::from([("p".to_string(), placement)]),
            analytics,
        }
    }

    #[test]
    fn test_estimate_cost_respects_free_quota() {
        let pricing = Pricing {
            cost_per_gb: 0.1,
            cost_per_request: 0.001,
            free_quota_gb: 1.0,
        };
        let three_gb = (3.0 * BYTES_PER_GB) as u64;
        assert!((estimate_cost(&pricing, three_gb, 100) - 0.3).abs() < 1e-9);

        let half_gb = (0.5 * BYTES_PER_GB) as u64;
        assert!((estimate_cost(&pricing, half_gb, 0)).abs() < 1e-12);
    }

    #[test]
    fn test_time_range_parsing_and_window() {
        assert_eq!("WEEK".parse::<TimeRange>().unwrap(), TimeRange::Week);
        assert!("decade".parse::<TimeRange>().is_err());
        let now = Utc::now();
        assert_eq!(TimeRange::Hour.since(now), Some(now - ChronoDuration::hours(1)));
        assert_eq!(TimeRange::All.since(now), None);
    }

    #[test]
    fn test_recommendations_classify_and_sort() {
        let files = Arc::new(FileStore::new());
        let gb = BYTES_PER_GB as u64;

        let stale = file(2 * gb, 120, 500);
        let cold = file(10 * gb, 45, 3);
        let busy_old = file(gb, 45, 50);
        let fresh = file(gb, 1, 0);
        for f in [&stale, &cold, &busy_old, &fresh] {
            files.insert_new(f.clone());
        }

        let service = AnalyticsService::new(AnalyticsConfig::default(), registry_with_pricing(1.0), files);
        let recs = service.cost_recommendations();

        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].file_id, cold.id);
        assert_eq!(recs[0].action, RecommendationAction::ColdTier);
        assert!((recs[0].estimated_monthly_savings - 8.0).abs() < 1e-9);
        assert_eq!(recs[1].file_id, stale.id);
        assert_eq!(recs[1].action, RecommendationAction::Delete);
        assert!(recs[1].days_since_access >= 120);
    }

    #[tokio::test]
    async fn test_report_filters_by_window_and_is_cached() {
        let files = Arc::new(FileStore::new());
        let mut recent = file(1024, 0, 0);
        recent.analytics.record_request("p", 1024, Some("DE"));
        let old = file(1024, 10, 7);
        files.insert_new(recent.clone());
        files.insert_new(old);

        let service = AnalyticsService::new(
            AnalyticsConfig::default(),
            registry_with_pricing(0.0),
            files.clone(),
        );

        let day = service.report(TimeRange::Day).await;
        assert_eq!(day.total_files, 2);
        assert_eq!(day.active_files, 1);
        assert_eq!(day.total_requests, 1);
        assert_eq!(day.top_countries[0].country, "DE");
        assert_eq!(day.providers[0].provider_id, "p");

        let all = service.report(TimeRange::All).await;
        assert_eq!(all.active_files, 2);
        assert_eq!(all.total_requests, 8);

        // Served from the snapshot cache until invalidated
        files.insert_new(file(1, 0, 0));
        assert_eq!(service.report(TimeRange::All).await.total_files, 2);
        service.invalidate();
        assert_eq!(service.report(TimeRange::All).await.total_files, 3);
    }
}

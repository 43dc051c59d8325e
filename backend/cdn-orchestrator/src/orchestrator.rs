/// CDN orchestrator facade
///
/// Wires the registry, health monitor, distribution, routing, purge and
/// analytics services around shared state and exposes the operations the
/// rest of the platform calls.
use crate::config::Settings;
use crate::error::{CdnError, Result};
use crate::models::{DistributedFile, HealthStatus, ProviderDefinition};
use crate::providers::{ProviderClientFactory, PurgeRequest};
use crate::services::{
    AnalyticsReport, AnalyticsService, CdnEvent, DistributionEngine, EventBus, FileStore,
    GeolocationCache, GeolocationResolver, HealthMonitor, ProbeOutcome, ProviderRegistry,
    PurgeCoordinator, PurgeReport, Recommendation, RouteRequest, RoutedUrl, RoutingEngine,
    TimeRange, UploadOptions, UrlCache,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub total_files: usize,
    pub total_providers: usize,
    pub healthy_providers: usize,
    /// URL cache hits over lookups, 0..=1
    pub cache_hit_rate: f64,
    /// Mean of the last probe latency across healthy providers, in ms
    pub avg_response_time: f64,
}

/// Provider definition with credentials redacted, plus its health
#[derive(Debug, Clone, Serialize)]
pub struct ProviderView {
    #[serde(flatten)]
    pub definition: ProviderDefinition,
    pub health: Option<HealthStatus>,
    /// Reason of the most recent failed call or probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

pub struct CdnOrchestrator {
    registry: Arc<ProviderRegistry>,
    health: Arc<HealthMonitor>,
    files: Arc<FileStore>,
    events: EventBus,
    url_cache: Arc<UrlCache>,
    distribution: DistributionEngine,
    routing: RoutingEngine,
    purge: PurgeCoordinator,
    analytics: Arc<AnalyticsService>,
}

impl CdnOrchestrator {
    pub fn new(
        settings: &Settings,
        factory: Arc<dyn ProviderClientFactory>,
        resolver: Option<Arc<dyn GeolocationResolver>>,
    ) -> Self {
        let events = EventBus::new();
        let registry = Arc::new(ProviderRegistry::new(factory));
        let health = Arc::new(HealthMonitor::new(
            settings.health_monitor_config(),
            events.clone(),
        ));
        let files = Arc::new(FileStore::new());
        let url_cache = Arc::new(UrlCache::new(
            settings.url_cache_capacity,
            Duration::from_secs(settings.url_cache_ttl_secs),
        ));
        let geo = Arc::new(GeolocationCache::new(
            resolver,
            settings.geo_cache_capacity,
            Duration::from_secs(settings.geo_cache_ttl_secs),
        ));

        let distribution = DistributionEngine::new(
            settings.distribution_config(),
            registry.clone(),
            health.clone(),
            files.clone(),
            events.clone(),
        );
        let routing = RoutingEngine::new(
            registry.clone(),
            health.clone(),
            files.clone(),
            geo,
            url_cache.clone(),
        );
        let purge = PurgeCoordinator::new(
            settings.purge_timeout(),
            registry.clone(),
            health.clone(),
            files.clone(),
            url_cache.clone(),
            events.clone(),
        );
        let analytics = Arc::new(AnalyticsService::new(
            settings.analytics_config(),
            registry.clone(),
            files.clone(),
        ));

        Self {
            registry,
            health,
            files,
            events,
            url_cache,
            distribution,
            routing,
            purge,
            analytics,
        }
    }

    /// Register a provider and start tracking its health with a closed breaker
    pub fn register_provider(&self, definition: ProviderDefinition) -> Result<()> {
        let provider_id = definition.id.clone();
        self.registry.register_provider(definition)?;
        self.health.track(&provider_id);
        self.events
            .publish(CdnEvent::ProviderRegistered { provider_id });
        Ok(())
    }

    pub fn update_provider(&self, definition: ProviderDefinition) -> Result<()> {
        self.registry.update_provider(definition)?;
        self.url_cache.invalidate_all();
        Ok(())
    }

    pub fn set_provider_enabled(&self, provider_id: &str, enabled: bool) -> Result<()> {
        self.registry.set_enabled(provider_id, enabled)?;
        self.url_cache.invalidate_all();
        Ok(())
    }

    pub fn providers(&self) -> Vec<ProviderView> {
        self.registry
            .list_all()
            .into_iter()
            .map(|definition| ProviderView {
                health: self.health.snapshot(&definition.id),
                last_error: self.health.last_error(&definition.id),
                definition: definition.redacted(),
            })
            .collect()
    }

    pub fn provider_health(&self, provider_id: &str) -> Result<HealthStatus> {
        self.health
            .snapshot(provider_id)
            .ok_or_else(|| CdnError::ProviderNotFound(provider_id.to_string()))
    }

    pub async fn upload_to_cdn(
        &self,
        data: Vec<u8>,
        filename: &str,
        mime_type: &str,
        user_id: &str,
        options: UploadOptions,
    ) -> Result<DistributedFile> {
        self.distribution
            .upload(data, filename, mime_type, user_id, options)
            .await
    }

    /// `Ok(None)` when no provider holds a cached copy
    pub async fn get_cdn_url(&self, request: RouteRequest) -> Result<Option<RoutedUrl>> {
        self.routing.route(request).await
    }

    pub async fn purge_content(&self, request: PurgeRequest) -> Result<PurgeReport> {
        let report = self.purge.purge(request).await?;
        self.analytics.invalidate();
        Ok(report)
    }

    pub async fn get_analytics(&self, range: Option<TimeRange>) -> AnalyticsReport {
        self.analytics.report(range.unwrap_or_default()).await
    }

    pub fn cost_recommendations(&self) -> Vec<Recommendation> {
        self.analytics.cost_recommendations()
    }

    pub fn get_file(&self, file_id: &Uuid) -> Result<DistributedFile> {
        self.files
            .get(file_id)
            .ok_or_else(|| CdnError::FileNotFound(file_id.to_string()))
    }

    pub fn get_system_status(&self) -> SystemStatus {
        let providers = self.registry.list_all();
        let healthy: Vec<HealthStatus> = providers
            .iter()
            .filter(|p| p.enabled)
            .filter_map(|p| self.health.snapshot(&p.id))
            .filter(HealthStatus::is_healthy)
            .collect();

        let latencies: Vec<u64> = healthy.iter().filter_map(|s| s.latency_ms).collect();
        let avg_response_time = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<u64>() as f64 / latencies.len() as f64
        };

        SystemStatus {
            total_files: self.files.len(),
            total_providers: providers.len(),
            healthy_providers: healthy.len(),
            cache_hit_rate: self.url_cache.hit_rate(),
            avg_response_time,
        }
    }

    /// Run one health probe round now
    pub async fn check_health(&self) -> Vec<(String, ProbeOutcome)> {
        self.health.check_all(&self.registry).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CdnEvent> {
        self.events.subscribe()
    }

    /// Start the health probe loop and the cost optimizer
    pub fn start_background_tasks(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!("Starting background tasks");
        vec![
            self.health
                .clone()
                .spawn(self.registry.clone(), shutdown.clone()),
            self.analytics.clone().spawn(shutdown),
        ]
    }
}

/// Orchestration services
///
/// Each collection has one owner: the registry owns provider definitions,
/// the health monitor owns breaker state, the file store owns file records.
pub mod analytics;
pub mod distribution;
pub mod events;
pub mod file_store;
pub mod geolocation;
pub mod health_monitor;
pub mod purge;
pub mod registry;
pub mod routing;

pub use analytics::{
    AnalyticsConfig, AnalyticsReport, AnalyticsService, Recommendation, RecommendationAction,
    TimeRange,
};
pub use distribution::{
    DistributionConfig, DistributionEngine, OptimizationPriority, UploadOptions,
};
pub use events::{CdnEvent, EventBus};
pub use file_store::FileStore;
pub use geolocation::{GeolocationCache, GeolocationResolver, HttpGeolocationResolver};
pub use health_monitor::{HealthMonitor, HealthMonitorConfig, ProbeOutcome};
pub use purge::{PurgeCoordinator, PurgeReport};
pub use registry::ProviderRegistry;
pub use routing::{
    CropMode, ImageFormat, RouteRequest, RoutedUrl, RoutingEngine, RoutingRule, UrlCache,
    UrlOptions,
};

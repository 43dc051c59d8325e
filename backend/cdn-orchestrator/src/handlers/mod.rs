/// HTTP handlers exposing the orchestrator
///
/// - Files: distribute uploads, fetch records, resolve delivery URLs
/// - Purge: cross-provider invalidation
/// - Analytics: usage reports and cost recommendations
/// - Providers: listing and enable/disable
/// - System: liveness, metrics, aggregate status
pub mod analytics;
pub mod files;
pub mod providers;
pub mod purge;
pub mod system;

use actix_web::web;

pub use analytics::{get_analytics, get_recommendations};
pub use files::{get_file, get_file_url, upload_file};
pub use providers::{disable_provider, enable_provider, list_providers};
pub use purge::purge_content;
pub use system::{health, metrics, status};

/// Register every route on an actix `App`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics))
        .service(
            web::scope("/api/v1")
                .route("/files", web::post().to(upload_file))
                .route("/files/{id}", web::get().to(get_file))
                .route("/files/{id}/url", web::get().to(get_file_url))
                .route("/purge", web::post().to(purge_content))
                .route("/analytics", web::get().to(get_analytics))
                .route("/analytics/recommendations", web::get().to(get_recommendations))
                .route("/status", web::get().to(status))
                .route("/providers", web::get().to(list_providers))
                .route("/providers/{id}/enable", web::post().to(enable_provider))
                .route("/providers/{id}/disable", web::post().to(disable_provider)),
        );
}

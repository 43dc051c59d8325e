/// Purge Coordinator
///
/// Fans one invalidation out to every enabled, healthy provider and reports
/// per-provider results. Placements are only marked `purged` on providers
/// that confirmed; the rest stay `cached` until a later purge succeeds.
use crate::error::{CdnError, ProviderError, ProviderFailure, Result};
use crate::metrics;
use crate::models::{PlacementStatus, ProviderDefinition};
use crate::providers::{ProviderClient, PurgeRequest};
use crate::services::events::{CdnEvent, EventBus};
use crate::services::file_store::FileStore;
use crate::services::health_monitor::HealthMonitor;
use crate::services::registry::ProviderRegistry;
use crate::services::routing::UrlCache;
use chrono::Utc;
use futures::future::join_all;
use resilience::{with_timeout_result, TimeoutError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PurgeReport {
    pub successful: Vec<String>,
    pub failed: Vec<ProviderFailure>,
}

pub struct PurgeCoordinator {
    purge_timeout: Duration,
    registry: Arc<ProviderRegistry>,
    health: Arc<HealthMonitor>,
    files: Arc<FileStore>,
    url_cache: Arc<UrlCache>,
    events: EventBus,
}

impl PurgeCoordinator {
    pub fn new(
        purge_timeout: Duration,
        registry: Arc<ProviderRegistry>,
        health: Arc<HealthMonitor>,
        files: Arc<FileStore>,
        url_cache: Arc<UrlCache>,
        events: EventBus,
    ) -> Self {
        Self {
            purge_timeout,
            registry,
            health,
            files,
            url_cache,
            events,
        }
    }

    pub async fn purge(&self, request: PurgeRequest) -> Result<PurgeReport> {
        if request.is_empty() {
            return Err(CdnError::Validation(
                "Purge needs at least one file id, tag or pattern".into(),
            ));
        }
        if let Some(missing) = request.file_ids.iter().find(|id| !self.files.contains(id)) {
            return Err(CdnError::FileNotFound(missing.to_string()));
        }

        let targets: Vec<_> = self
            .registry
            .enabled_with_clients()
            .into_iter()
            .filter(|(d, _)| d.capabilities.purge && self.health.is_healthy(&d.id))
            .collect();

        if targets.is_empty() {
            warn!("No healthy providers to purge; only local caches invalidated");
        }

        let attempts = targets.into_iter().map(|(definition, client)| {
            let request = &request;
            async move { self.attempt_purge(&definition, client, request).await }
        });
        let outcomes = join_all(attempts).await;

        let mut report = PurgeReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(provider_id) => report.successful.push(provider_id),
                Err(failure) => report.failed.push(failure),
            }
        }

        self.mark_purged(&request, &report.successful);

        // Stale transformed URLs are worse than a recomputation
        self.url_cache.invalidate_all();

        info!(
            file_ids = request.file_ids.len(),
            tags = request.tags.len(),
            patterns = request.patterns.len(),
            successful = report.successful.len(),
            failed = report.failed.len(),
            "Purge completed"
        );

        self.events.publish(CdnEvent::ContentPurged {
            request,
            successful: report.successful.clone(),
            failed: report.failed.clone(),
        });

        Ok(report)
    }

    fn mark_purged(&self, request: &PurgeRequest, successful: &[String]) {
        if successful.is_empty() {
            return;
        }
        for file_id in &request.file_ids {
            let updated = self.files.update(file_id, |file| {
                let mut changed = false;
                for provider_id in successful {
                    if let Some(placement) = file.placements.get_mut(provider_id) {
                        if placement.status == PlacementStatus::Cached {
                            placement.status = PlacementStatus::Purged;
                            changed = true;
                        }
                    }
                }
                if changed {
                    file.updated_at = Utc::now();
                    Some(file.clone())
                } else {
                    None
                }
            });
            if let Some(Some(file)) = updated {
                self.events.publish(CdnEvent::FileUpdated { file });
            }
        }
    }

    /// Ok(provider id) on success
    async fn attempt_purge(
        &self,
        definition: &ProviderDefinition,
        client: Arc<dyn ProviderClient>,
        request: &PurgeRequest,
    ) -> std::result::Result<String, ProviderFailure> {
        let provider_id = definition.id.as_str();
        let failure = |reason: String| ProviderFailure {
            provider_id: provider_id.to_string(),
            reason,
        };

        if !request.tags.is_empty() && !definition.capabilities.purge_by_tag {
            return Err(failure(
                ProviderError::Unsupported("purge by tag".into()).to_string(),
            ));
        }
        if !request.patterns.is_empty() && !definition.capabilities.purge_by_pattern {
            return Err(failure(
                ProviderError::Unsupported("purge by pattern".into()).to_string(),
            ));
        }

        self.health
            .permit(provider_id)
            .map_err(|e| failure(e.to_string()))?;

        let timeout = definition.timeouts.purge_or(self.purge_timeout);
        match with_timeout_result(timeout, client.purge(request)).await {
            Ok(()) => {
                self.health.record_success(provider_id, None);
                metrics::record_provider_operation(provider_id, "purge", true);
                Ok(provider_id.to_string())
            }
            Err(err) => {
                let reason = match err {
                    TimeoutError::Elapsed(d) => format!("purge timed out after {:?}", d),
                    TimeoutError::Inner(e) => e.to_string(),
                };
                let error = CdnError::ProviderPurgeFailed {
                    provider_id: provider_id.to_string(),
                    reason: reason.clone(),
                };
                warn!(provider_id, error = %error, "Provider purge failed");
                self.health.record_failure(provider_id, &reason);
                metrics::record_provider_operation(provider_id, "purge", false);
                Err(failure(reason))
            }
        }
    }
}

/// Distribution Engine
///
/// Content-addressed upload orchestration: dedup by SHA-256, pick up to
/// `redundancy_factor` healthy providers ranked by the requested priority,
/// upload to all of them concurrently and keep every outcome as a placement.
use crate::error::{CdnError, ProviderFailure, Result};
use crate::metrics;
use crate::models::{
    DistributedFile, FileAnalytics, PlacementStatus, ProviderDefinition, ProviderPlacement,
};
use crate::providers::{ProviderClient, UploadRequest};
use crate::services::events::{CdnEvent, EventBus};
use crate::services::file_store::FileStore;
use crate::services::health_monitor::HealthMonitor;
use crate::services::registry::ProviderRegistry;
use chrono::Utc;
use futures::future::join_all;
use resilience::{with_timeout_result, TimeoutError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationPriority {
    Speed,
    Cost,
    #[default]
    Quality,
    Coverage,
}

impl OptimizationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Speed => "speed",
            Self::Cost => "cost",
            Self::Quality => "quality",
            Self::Coverage => "coverage",
        }
    }
}

impl std::str::FromStr for OptimizationPriority {
    type Err = CdnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "speed" => Ok(Self::Speed),
            "cost" => Ok(Self::Cost),
            "quality" => Ok(Self::Quality),
            "coverage" => Ok(Self::Coverage),
            other => Err(CdnError::Validation(format!(
                "Unknown optimization priority: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Region constraint; empty means any region
    pub regions: Vec<String>,
    pub priority: Option<OptimizationPriority>,
    pub tags: Vec<String>,
    pub force_refresh: bool,
}

#[derive(Debug, Clone)]
pub struct DistributionConfig {
    pub redundancy_factor: usize,
    pub upload_timeout: Duration,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            redundancy_factor: 3,
            upload_timeout: resilience::upload_config().timeout.duration,
        }
    }
}

/// A provider eligible for an upload together with its last measured latency
#[derive(Debug, Clone)]
pub struct Candidate {
    pub definition: ProviderDefinition,
    pub latency: Option<Duration>,
}

fn by_priority_then_id(a: &Candidate, b: &Candidate) -> Ordering {
    a.definition
        .priority
        .cmp(&b.definition.priority)
        .then_with(|| a.definition.id.cmp(&b.definition.id))
}

/// Order candidates best-first for the requested priority.
/// Ties always fall back to configured priority rank, then id.
pub fn rank_candidates(candidates: &mut [Candidate], priority: OptimizationPriority) {
    match priority {
        OptimizationPriority::Cost => candidates.sort_by(|a, b| {
            a.definition
                .pricing
                .cost_per_gb
                .total_cmp(&b.definition.pricing.cost_per_gb)
                .then_with(|| by_priority_then_id(a, b))
        }),
        OptimizationPriority::Speed => candidates.sort_by(|a, b| {
            // Unmeasured latency sorts last
            match (a.latency, b.latency) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
            .then_with(|| by_priority_then_id(a, b))
        }),
        OptimizationPriority::Coverage => candidates.sort_by(|a, b| {
            b.definition
                .regions
                .len()
                .cmp(&a.definition.regions.len())
                .then_with(|| by_priority_then_id(a, b))
        }),
        OptimizationPriority::Quality => candidates.sort_by(by_priority_then_id),
    }
}

pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub struct DistributionEngine {
    config: DistributionConfig,
    registry: Arc<ProviderRegistry>,
    health: Arc<HealthMonitor>,
    files: Arc<FileStore>,
    events: EventBus,
}

impl DistributionEngine {
    pub fn new(
        config: DistributionConfig,
        registry: Arc<ProviderRegistry>,
        health: Arc<HealthMonitor>,
        files: Arc<FileStore>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            registry,
            health,
            files,
            events,
        }
    }

    /// Distribute `data` across providers, or return the existing record for
    /// identical content unless `force_refresh` is set.
    pub async fn upload(
        &self,
        data: Vec<u8>,
        filename: &str,
        mime_type: &str,
        owner_id: &str,
        options: UploadOptions,
    ) -> Result<DistributedFile> {
        if filename.trim().is_empty() {
            return Err(CdnError::Validation("Filename must not be empty".into()));
        }
        if data.is_empty() {
            return Err(CdnError::Validation("File is empty".into()));
        }

        let hash = content_hash(&data);

        if !options.force_refresh {
            if let Some(existing) = self.bump_existing(&hash) {
                return Ok(existing);
            }
        }

        let previous_id = if options.force_refresh {
            self.files.find_by_hash(&hash)
        } else {
            None
        };

        let candidates = self.select_providers(&options);
        if candidates.is_empty() {
            metrics::record_upload("rejected");
            warn!(filename, "No healthy providers for upload");
            return Err(CdnError::NoHealthyProviders);
        }

        let file_id = previous_id.unwrap_or_else(Uuid::new_v4);
        let size = data.len() as u64;
        let request = UploadRequest {
            file_id,
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            data: Arc::new(data),
            tags: options.tags.clone(),
        };

        info!(
            file_id = %file_id,
            filename,
            size,
            providers = ?candidates.iter().map(|(d, _)| d.id.as_str()).collect::<Vec<_>>(),
            "Distributing file"
        );

        // Gather every attempt; no early return on first success
        let attempts = candidates.into_iter().map(|(definition, client)| {
            let request = &request;
            async move {
                let timeout = definition.timeouts.upload_or(self.config.upload_timeout);
                self.attempt_upload(&definition.id, client, request, size, timeout)
                    .await
            }
        });
        let placements = join_all(attempts).await;

        let cached = placements.iter().filter(|p| p.is_cached()).count();
        if cached == 0 {
            let failures: Vec<ProviderFailure> = placements
                .into_iter()
                .map(|p| ProviderFailure {
                    reason: p.error.unwrap_or_else(|| "unknown error".to_string()),
                    provider_id: p.provider_id,
                })
                .collect();
            metrics::record_upload("failed");
            warn!(file_id = %file_id, attempted = failures.len(), "Upload failed on every provider");
            return Err(CdnError::DistributionFailed { failures });
        }

        let now = Utc::now();
        let file = match previous_id {
            // Only distribution-owned fields change; analytics and placements
            // on providers outside this attempt keep their live values
            Some(id) => self
                .files
                .update(&id, |file| {
                    for placement in placements {
                        file.placements.insert(placement.provider_id.clone(), placement);
                    }
                    file.filename = filename.to_string();
                    file.mime_type = mime_type.to_string();
                    file.regions = options.regions;
                    file.tags = options.tags;
                    file.updated_at = now;
                    file.access_count = file.access_count.saturating_add(1);
                    file.clone()
                })
                .ok_or_else(|| CdnError::FileNotFound(id.to_string()))?,
            None => {
                let draft = DistributedFile {
                    id: file_id,
                    content_hash: hash,
                    filename: filename.to_string(),
                    mime_type: mime_type.to_string(),
                    size,
                    owner_id: owner_id.to_string(),
                    created_at: now,
                    updated_at: now,
                    access_count: 1,
                    regions: options.regions,
                    tags: options.tags,
                    placements: placements
                        .into_iter()
                        .map(|p| (p.provider_id.clone(), p))
                        .collect::<BTreeMap<_, _>>(),
                    analytics: FileAnalytics::new(now),
                };
                let (stored, inserted) = self.files.insert_new(draft);
                if !inserted {
                    // A concurrent upload of the same bytes won the race
                    debug!(file_id = %stored.id, "Concurrent upload already stored this content");
                    return self.bump_existing(&stored.content_hash).ok_or_else(|| {
                        CdnError::FileNotFound(stored.id.to_string())
                    });
                }
                stored
            }
        };

        metrics::record_upload("distributed");
        info!(
            file_id = %file.id,
            cached,
            attempted = file.placements.len(),
            "File distributed"
        );
        self.events.publish(CdnEvent::FileUploaded { file: file.clone() });
        Ok(file)
    }

    fn bump_existing(&self, hash: &str) -> Option<DistributedFile> {
        let id = self.files.find_by_hash(hash)?;
        let file = self.files.update(&id, |f| {
            f.access_count = f.access_count.saturating_add(1);
            f.updated_at = Utc::now();
            f.clone()
        })?;

        metrics::record_upload("deduplicated");
        debug!(file_id = %file.id, access_count = file.access_count, "Duplicate content, reusing file");
        self.events.publish(CdnEvent::FileDeduplicated {
            file_id: file.id,
            access_count: file.access_count,
        });
        Some(file)
    }

    /// Healthy enabled providers matching the region constraint, ranked and
    /// capped at the redundancy factor
    fn select_providers(
        &self,
        options: &UploadOptions,
    ) -> Vec<(ProviderDefinition, Arc<dyn ProviderClient>)> {
        let mut clients = std::collections::HashMap::new();
        let mut candidates = Vec::new();

        for (definition, client) in self.registry.enabled_with_clients() {
            if !self.health.is_healthy(&definition.id) {
                continue;
            }
            if !options.regions.is_empty() && !definition.serves_any_region(&options.regions) {
                continue;
            }
            let latency = self
                .health
                .snapshot(&definition.id)
                .and_then(|s| s.latency_ms)
                .map(Duration::from_millis);
            clients.insert(definition.id.clone(), client);
            candidates.push(Candidate {
                definition,
                latency,
            });
        }

        rank_candidates(&mut candidates, options.priority.unwrap_or_default());

        candidates
            .into_iter()
            .take(self.config.redundancy_factor)
            .filter_map(|c| {
                let client = clients.remove(&c.definition.id)?;
                Some((c.definition, client))
            })
            .collect()
    }

    async fn attempt_upload(
        &self,
        provider_id: &str,
        client: Arc<dyn ProviderClient>,
        request: &UploadRequest,
        size: u64,
        timeout: Duration,
    ) -> ProviderPlacement {
        let mut placement = ProviderPlacement::uploading(provider_id, size);

        if let Err(e) = self.health.permit(provider_id) {
            placement.status = PlacementStatus::Failed;
            placement.error = Some(e.to_string());
            return placement;
        }

        match with_timeout_result(timeout, client.upload(request)).await {
            Ok(receipt) => {
                self.health.record_success(provider_id, None);
                metrics::record_provider_operation(provider_id, "upload", true);
                placement.status = PlacementStatus::Cached;
                placement.url = Some(receipt.url);
                placement.etag = receipt.etag;
                placement.metadata = receipt.metadata;
                placement.uploaded_at = Some(Utc::now());
            }
            Err(err) => {
                let reason = match err {
                    TimeoutError::Elapsed(d) => format!("upload timed out after {:?}", d),
                    TimeoutError::Inner(e) => e.to_string(),
                };
                let failure = CdnError::ProviderUploadFailed {
                    provider_id: provider_id.to_string(),
                    reason: reason.clone(),
                };
                warn!(provider_id, file_id = %request.file_id, error = %failure, "Provider upload failed");
                self.health.record_failure(provider_id, &reason);
                metrics::record_provider_operation(provider_id, "upload", false);
                placement.status = PlacementStatus::Failed;
                placement.error = Some(reason);
            }
        }

        placement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Capabilities, Pricing, ProviderConfig, ProviderTimeouts};

    fn candidate(id: &str, priority: u32, cost: f64, regions: usize, latency: Option<u64>) -> Candidate {
        Candidate {
            definition: ProviderDefinition {
                id: id.into(),
                name: id.into(),
                config: ProviderConfig::Generic {
                    endpoint: "https://cdn.example.com".into(),
                    api_key: None,
                    delivery_base: None,
                },
                enabled: true,
                priority,
                regions: (0..regions).map(|i| format!("r{}", i)).collect(),
                capabilities: Capabilities::default(),
                pricing: Pricing {
                    cost_per_gb: cost,
                    ..Default::default()
                },
                timeouts: ProviderTimeouts::default(),
            },
            latency: latency.map(Duration::from_millis),
        }
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.definition.id.as_str()).collect()
    }

    fn abc() -> Vec<Candidate> {
        vec![
            candidate("a", 1, 5.0, 1, Some(80)),
            candidate("b", 2, 2.0, 3, None),
            candidate("c", 3, 1.0, 2, Some(20)),
        ]
    }

    #[test]
    fn test_cost_ranks_cheapest_first() {
        let mut c = abc();
        rank_candidates(&mut c, OptimizationPriority::Cost);
        assert_eq!(ids(&c), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_speed_puts_unmeasured_last() {
        let mut c = abc();
        rank_candidates(&mut c, OptimizationPriority::Speed);
        assert_eq!(ids(&c), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_coverage_prefers_more_regions() {
        let mut c = abc();
        rank_candidates(&mut c, OptimizationPriority::Coverage);
        assert_eq!(ids(&c), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_default_uses_priority_rank_and_id_tiebreak() {
        let mut c = vec![
            candidate("z", 2, 1.0, 1, None),
            candidate("y", 2, 1.0, 1, None),
            candidate("x", 1, 9.0, 1, None),
        ];
        rank_candidates(&mut c, OptimizationPriority::default());
        assert_eq!(ids(&c), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_priority_parsing() {
        assert_eq!("COST".parse::<OptimizationPriority>().unwrap(), OptimizationPriority::Cost);
        assert!(matches!(
            "cheapest".parse::<OptimizationPriority>(),
            Err(CdnError::Validation(_))
        ));
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}

/// Health Monitor
///
/// Owns one circuit breaker and health record per provider. Probes run on a
/// fixed interval, concurrently across providers, and each probe records its
/// own outcome as soon as it settles. Distribution and purge report their
/// results here as implicit health signals.
use crate::error::{CdnError, Result};
use crate::metrics;
use crate::models::{BreakerState, HealthState, HealthStatus};
use crate::providers::ProviderClient;
use crate::services::events::{CdnEvent, EventBus};
use crate::services::registry::ProviderRegistry;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use resilience::{with_timeout_result, CircuitBreaker, CircuitBreakerConfig, TimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    /// Error count above which a closed provider reports `degraded`
    pub degraded_error_threshold: u32,
    pub uptime_window: usize,
    pub probe_timeout: Duration,
    pub interval: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        let probe = resilience::probe_config();
        Self {
            failure_threshold: probe.circuit_breaker.failure_threshold,
            cooldown: probe.circuit_breaker.cooldown,
            degraded_error_threshold: 3,
            uptime_window: probe.circuit_breaker.window_size,
            probe_timeout: probe.timeout.duration,
            interval: Duration::from_secs(30),
        }
    }
}

/// Result of one probe attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Healthy(Duration),
    Failed(String),
    /// Circuit open and cooling down; no network call was made
    Skipped,
}

struct HealthRecord {
    status: HealthState,
    last_check: Option<DateTime<Utc>>,
    latency: Option<Duration>,
    error_count: u32,
    last_error: Option<String>,
}

struct ProviderHealth {
    breaker: CircuitBreaker,
    record: Mutex<HealthRecord>,
}

pub struct HealthMonitor {
    config: HealthMonitorConfig,
    providers: DashMap<String, Arc<ProviderHealth>>,
    events: EventBus,
}

impl HealthMonitor {
    pub fn new(config: HealthMonitorConfig, events: EventBus) -> Self {
        info!(
            failure_threshold = config.failure_threshold,
            cooldown_secs = config.cooldown.as_secs(),
            interval_secs = config.interval.as_secs(),
            "Initializing health monitor"
        );
        Self {
            config,
            providers: DashMap::new(),
            events,
        }
    }

    pub fn config(&self) -> &HealthMonitorConfig {
        &self.config
    }

    /// Start tracking a provider with a closed breaker
    pub fn track(&self, provider_id: &str) {
        self.providers
            .entry(provider_id.to_string())
            .or_insert_with(|| {
                Arc::new(ProviderHealth {
                    breaker: CircuitBreaker::named(
                        provider_id.to_string(),
                        CircuitBreakerConfig {
                            failure_threshold: self.config.failure_threshold,
                            cooldown: self.config.cooldown,
                            window_size: self.config.uptime_window,
                        },
                    ),
                    record: Mutex::new(HealthRecord {
                        status: HealthState::Healthy,
                        last_check: None,
                        latency: None,
                        error_count: 0,
                        last_error: None,
                    }),
                })
            });
    }

    fn entry(&self, provider_id: &str) -> Option<Arc<ProviderHealth>> {
        self.providers.get(provider_id).map(|h| h.clone())
    }

    /// Gate in front of every provider network call.
    ///
    /// Rejections are fail-fast and are not counted as failures. A granted
    /// permit must be followed by `record_success` or `record_failure`.
    pub fn permit(&self, provider_id: &str) -> Result<()> {
        let health = self
            .entry(provider_id)
            .ok_or_else(|| CdnError::ProviderNotFound(provider_id.to_string()))?;
        let before = BreakerState::from(health.breaker.state());

        let granted = health.breaker.try_acquire::<()>().is_ok();
        self.publish_transition(provider_id, before, &health);

        if granted {
            Ok(())
        } else {
            debug!(provider_id, "Call rejected by open circuit");
            Err(CdnError::CircuitBreakerOpen(provider_id.to_string()))
        }
    }

    pub fn record_success(&self, provider_id: &str, latency: Option<Duration>) {
        let Some(health) = self.entry(provider_id) else {
            return;
        };
        let before = BreakerState::from(health.breaker.state());
        health.breaker.record_success();

        {
            let mut record = health.record.lock();
            record.last_check = Some(Utc::now());
            if latency.is_some() {
                record.latency = latency;
            }
            record.error_count = record.error_count.saturating_sub(1);
            record.status = if health.breaker.state() != resilience::CircuitState::Closed {
                HealthState::Unhealthy
            } else if record.error_count > self.config.degraded_error_threshold {
                HealthState::Degraded
            } else {
                HealthState::Healthy
            };
        }

        self.publish_transition(provider_id, before, &health);
    }

    pub fn record_failure(&self, provider_id: &str, reason: &str) {
        let Some(health) = self.entry(provider_id) else {
            return;
        };
        let before = BreakerState::from(health.breaker.state());
        health.breaker.record_failure();

        {
            let mut record = health.record.lock();
            record.last_check = Some(Utc::now());
            record.error_count = record.error_count.saturating_add(1);
            record.last_error = Some(reason.to_string());
            record.status = if health.breaker.state() == resilience::CircuitState::Closed {
                HealthState::Degraded
            } else {
                HealthState::Unhealthy
            };
        }

        self.publish_transition(provider_id, before, &health);
    }

    fn publish_transition(&self, provider_id: &str, before: BreakerState, health: &ProviderHealth) {
        let after = BreakerState::from(health.breaker.state());
        if before != after {
            self.events.publish(CdnEvent::ProviderStateChanged {
                provider_id: provider_id.to_string(),
                from: before,
                to: after,
            });
        }
    }

    /// True iff status is healthy/degraded and the breaker is closed
    pub fn is_healthy(&self, provider_id: &str) -> bool {
        self.snapshot(provider_id)
            .map(|s| s.is_healthy())
            .unwrap_or(false)
    }

    pub fn snapshot(&self, provider_id: &str) -> Option<HealthStatus> {
        let health = self.entry(provider_id)?;
        let record = health.record.lock();
        let next_retry = health
            .breaker
            .retry_after()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| Utc::now() + d);

        Some(HealthStatus {
            provider_id: provider_id.to_string(),
            status: record.status,
            last_check: record.last_check,
            latency_ms: record.latency.map(|d| d.as_millis() as u64),
            error_count: record.error_count,
            uptime: health.breaker.success_rate() * 100.0,
            consecutive_failures: health.breaker.consecutive_failures(),
            circuit_state: health.breaker.state().into(),
            next_retry,
        })
    }

    pub fn snapshot_all(&self) -> Vec<HealthStatus> {
        let mut ids: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids.iter().filter_map(|id| self.snapshot(id)).collect()
    }

    pub fn last_error(&self, provider_id: &str) -> Option<String> {
        self.entry(provider_id)
            .and_then(|h| h.record.lock().last_error.clone())
    }

    /// Probe one provider now
    pub async fn check_provider(
        &self,
        provider_id: &str,
        client: Arc<dyn ProviderClient>,
        timeout: Duration,
    ) -> ProbeOutcome {
        if self.permit(provider_id).is_err() {
            return ProbeOutcome::Skipped;
        }

        match with_timeout_result(timeout, client.health_probe()).await {
            Ok(latency) => {
                metrics::observe_probe_latency(provider_id, latency);
                self.record_success(provider_id, Some(latency));
                debug!(provider_id, latency_ms = latency.as_millis() as u64, "Health probe ok");
                ProbeOutcome::Healthy(latency)
            }
            Err(err) => {
                let reason = match err {
                    TimeoutError::Elapsed(d) => format!("probe timed out after {:?}", d),
                    TimeoutError::Inner(e) => e.to_string(),
                };
                warn!(provider_id, %reason, "Health probe failed");
                self.record_failure(provider_id, &reason);
                ProbeOutcome::Failed(reason)
            }
        }
    }

    /// Probe every enabled provider concurrently
    pub async fn check_all(&self, registry: &ProviderRegistry) -> Vec<(String, ProbeOutcome)> {
        let probes = registry
            .enabled_with_clients()
            .into_iter()
            .map(|(definition, client)| {
                let timeout = definition.timeouts.probe_or(self.config.probe_timeout);
                async move {
                    let outcome = self.check_provider(&definition.id, client, timeout).await;
                    (definition.id, outcome)
                }
            });

        join_all(probes).await
    }

    /// Run probes on the configured interval until `shutdown` flips to true
    pub fn spawn(
        self: Arc<Self>,
        registry: Arc<ProviderRegistry>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcomes = self.check_all(&registry).await;
                        let failed = outcomes
                            .iter()
                            .filter(|(_, o)| matches!(o, ProbeOutcome::Failed(_)))
                            .count();
                        debug!(probed = outcomes.len(), failed, "Health check round complete");
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Health monitor stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}

//! Shared fixtures for integration tests: scriptable provider clients
#![allow(dead_code)]

use async_trait::async_trait;
use cdn_orchestrator::error::{CdnError, ProviderError};
use cdn_orchestrator::models::{
    Capabilities, Pricing, ProviderConfig, ProviderDefinition, ProviderTimeouts,
};
use cdn_orchestrator::providers::{
    ProviderClient, ProviderClientFactory, PurgeRequest, UploadReceipt, UploadRequest,
};
use cdn_orchestrator::{CdnOrchestrator, Settings};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct MockProviderClient {
    id: String,
    uploads: AtomicUsize,
    purges: AtomicUsize,
    probes: AtomicUsize,
    fail_uploads: AtomicBool,
    fail_purges: AtomicBool,
    fail_probes: AtomicBool,
    probe_latency: Mutex<Duration>,
    delay: Mutex<Duration>,
    last_purge: Mutex<Option<PurgeRequest>>,
}

impl MockProviderClient {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            uploads: AtomicUsize::new(0),
            purges: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            fail_uploads: AtomicBool::new(false),
            fail_purges: AtomicBool::new(false),
            fail_probes: AtomicBool::new(false),
            probe_latency: Mutex::new(Duration::from_millis(50)),
            delay: Mutex::new(Duration::ZERO),
            last_purge: Mutex::new(None),
        }
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_purges(&self, fail: bool) {
        self.fail_purges.store(fail, Ordering::SeqCst);
    }

    pub fn fail_probes(&self, fail: bool) {
        self.fail_probes.store(fail, Ordering::SeqCst);
    }

    pub fn set_probe_latency(&self, latency: Duration) {
        *self.probe_latency.lock() = latency;
    }

    /// Every call sleeps this long before answering
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn purges(&self) -> usize {
        self.purges.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn last_purge(&self) -> Option<PurgeRequest> {
        self.last_purge.lock().clone()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn unavailable() -> ProviderError {
        ProviderError::Status {
            status: 503,
            body: "service unavailable".into(),
        }
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    async fn upload(&self, request: &UploadRequest) -> Result<UploadReceipt, ProviderError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(UploadReceipt {
            url: format!(
                "https://{}.cdn.test/{}/{}",
                self.id, request.file_id, request.filename
            ),
            etag: Some(format!("etag-{}", request.data.len())),
            metadata: HashMap::new(),
        })
    }

    async fn purge(&self, request: &PurgeRequest) -> Result<(), ProviderError> {
        self.purges.fetch_add(1, Ordering::SeqCst);
        *self.last_purge.lock() = Some(request.clone());
        self.pause().await;
        if self.fail_purges.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(())
    }

    async fn health_probe(&self) -> Result<Duration, ProviderError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_probes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(*self.probe_latency.lock())
    }
}

/// Hands out one shared mock per provider id
#[derive(Default)]
pub struct MockClientFactory {
    clients: Mutex<HashMap<String, Arc<MockProviderClient>>>,
}

impl MockClientFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn client(&self, provider_id: &str) -> Arc<MockProviderClient> {
        self.clients
            .lock()
            .entry(provider_id.to_string())
            .or_insert_with(|| Arc::new(MockProviderClient::new(provider_id)))
            .clone()
    }
}

impl ProviderClientFactory for MockClientFactory {
    fn build(&self, definition: &ProviderDefinition) -> Result<Arc<dyn ProviderClient>, CdnError> {
        Ok(self.client(&definition.id))
    }
}

pub fn provider(id: &str, priority: u32, cost_per_gb: f64, regions: &[&str]) -> ProviderDefinition {
    ProviderDefinition {
        id: id.to_string(),
        name: id.to_uppercase(),
        config: ProviderConfig::Generic {
            endpoint: format!("https://api.{}.cdn.test", id),
            api_key: Some(format!("{}-secret-key", id)),
            delivery_base: None,
        },
        enabled: true,
        priority,
        regions: regions.iter().map(|r| r.to_string()).collect(),
        capabilities: Capabilities {
            purge_by_tag: true,
            purge_by_pattern: true,
            ..Default::default()
        },
        pricing: Pricing {
            cost_per_gb,
            cost_per_request: 0.0,
            free_quota_gb: 0.0,
        },
        timeouts: ProviderTimeouts::default(),
    }
}

pub fn orchestrator(factory: Arc<MockClientFactory>) -> CdnOrchestrator {
    CdnOrchestrator::new(&Settings::default(), factory, None)
}

/// Orchestrator with the given providers already registered
pub fn orchestrator_with(providers: Vec<ProviderDefinition>) -> (CdnOrchestrator, Arc<MockClientFactory>) {
    let factory = MockClientFactory::new();
    let orchestrator = orchestrator(factory.clone());
    for definition in providers {
        orchestrator.register_provider(definition).unwrap();
    }
    (orchestrator, factory)
}

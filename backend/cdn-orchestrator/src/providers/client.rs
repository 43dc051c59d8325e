/// Contract every edge provider backend implements
use crate::error::{CdnError, ProviderError};
use crate::models::ProviderDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Payload handed to each provider during fan-out; the bytes are shared
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_id: Uuid,
    pub filename: String,
    pub mime_type: String,
    pub data: Arc<Vec<u8>>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UploadReceipt {
    pub url: String,
    pub etag: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Invalidation targets; any combination may be supplied
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurgeRequest {
    #[serde(default)]
    pub file_ids: Vec<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl PurgeRequest {
    pub fn is_empty(&self) -> bool {
        self.file_ids.is_empty() && self.tags.is_empty() && self.patterns.is_empty()
    }
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn upload(&self, request: &UploadRequest) -> Result<UploadReceipt, ProviderError>;

    async fn purge(&self, request: &PurgeRequest) -> Result<(), ProviderError>;

    /// Returns the measured round-trip latency
    async fn health_probe(&self) -> Result<Duration, ProviderError>;
}

/// Builds the provider-scoped client handle for a definition
pub trait ProviderClientFactory: Send + Sync {
    fn build(&self, definition: &ProviderDefinition) -> Result<Arc<dyn ProviderClient>, CdnError>;
}

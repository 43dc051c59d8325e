/// Outbound notifications for metadata persistence and other listeners
use crate::error::ProviderFailure;
use crate::models::{BreakerState, DistributedFile};
use crate::providers::PurgeRequest;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CdnEvent {
    ProviderRegistered {
        provider_id: String,
    },
    ProviderStateChanged {
        provider_id: String,
        from: BreakerState,
        to: BreakerState,
    },
    FileUploaded {
        file: DistributedFile,
    },
    FileDeduplicated {
        file_id: Uuid,
        access_count: u64,
    },
    FileUpdated {
        file: DistributedFile,
    },
    ContentPurged {
        request: PurgeRequest,
        successful: Vec<String>,
        failed: Vec<ProviderFailure>,
    },
}

/// Broadcast fan-out of [`CdnEvent`]s; publishing never blocks and never fails
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CdnEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: CdnEvent) {
        if self.sender.send(event).is_err() {
            trace!("No event subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CdnEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementStatus {
    Uploading,
    Cached,
    Failed,
    Purged,
}

impl PlacementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Cached => "cached",
            Self::Failed => "failed",
            Self::Purged => "purged",
        }
    }
}

/// One provider's copy of a file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPlacement {
    pub provider_id: String,
    pub url: Option<String>,
    pub status: PlacementStatus,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub size: u64,
    pub etag: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Failure reason when `status` is `failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderPlacement {
    pub fn uploading(provider_id: &str, size: u64) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            url: None,
            status: PlacementStatus::Uploading,
            uploaded_at: None,
            size,
            etag: None,
            metadata: HashMap::new(),
            error: None,
        }
    }

    pub fn is_cached(&self) -> bool {
        self.status == PlacementStatus::Cached
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderUsage {
    pub requests: u64,
    pub bytes: u64,
}

/// Counters accumulated by routing; never decrease
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalytics {
    pub total_requests: u64,
    pub total_bytes: u64,
    /// Requests per ISO country code
    pub countries: HashMap<String, u64>,
    pub providers: HashMap<String, ProviderUsage>,
    /// Time of the last recorded access (creation time until first read)
    pub last_accessed_at: DateTime<Utc>,
}

impl FileAnalytics {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            total_requests: 0,
            total_bytes: 0,
            countries: HashMap::new(),
            providers: HashMap::new(),
            last_accessed_at: now,
        }
    }

    pub fn record_request(&mut self, provider_id: &str, bytes: u64, country: Option<&str>) {
        self.total_requests = self.total_requests.saturating_add(1);
        self.total_bytes = self.total_bytes.saturating_add(bytes);

        let usage = self.providers.entry(provider_id.to_string()).or_default();
        usage.requests = usage.requests.saturating_add(1);
        usage.bytes = usage.bytes.saturating_add(bytes);

        if let Some(country) = country {
            *self.countries.entry(country.to_string()).or_insert(0) += 1;
        }

        let now = Utc::now();
        if now > self.last_accessed_at {
            self.last_accessed_at = now;
        }
    }
}

/// A logically distinct uploaded object, deduplicated by content hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedFile {
    pub id: Uuid,
    pub content_hash: String,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub access_count: u64,
    pub regions: Vec<String>,
    pub tags: Vec<String>,
    pub placements: BTreeMap<String, ProviderPlacement>,
    pub analytics: FileAnalytics,
}

impl DistributedFile {
    pub fn is_servable(&self) -> bool {
        self.placements.values().any(ProviderPlacement::is_cached)
    }

    pub fn cached_placements(&self) -> impl Iterator<Item = &ProviderPlacement> {
        self.placements.values().filter(|p| p.is_cached())
    }

    pub fn cached_placement(&self, provider_id: &str) -> Option<&ProviderPlacement> {
        self.placements.get(provider_id).filter(|p| p.is_cached())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_request_accumulates() {
        let created = Utc::now() - chrono::Duration::days(3);
        let mut analytics = FileAnalytics::new(created);

        analytics.record_request("a", 100, Some("DE"));
        analytics.record_request("a", 100, None);
        analytics.record_request("b", 50, Some("DE"));

        assert_eq!(analytics.total_requests, 3);
        assert_eq!(analytics.total_bytes, 250);
        assert_eq!(analytics.countries.get("DE"), Some(&2));
        assert_eq!(
            analytics.providers.get("a"),
            Some(&ProviderUsage {
                requests: 2,
                bytes: 200
            })
        );
        assert!(analytics.last_accessed_at > created);
    }

    #[test]
    fn test_placement_status_serializes_lowercase() {
        let json = serde_json::to_string(&PlacementStatus::Purged).unwrap();
        assert_eq!(json, "\"purged\"");
    }
}

/// Provider definitions
///
/// Connection details are a tagged union per provider kind so that only the
/// client factory ever looks at kind-specific fields.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Cloudflare,
    CloudFront,
    Fastly,
    Bunny,
    Generic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cloudflare => "cloudflare",
            Self::CloudFront => "cloudfront",
            Self::Fastly => "fastly",
            Self::Bunny => "bunny",
            Self::Generic => "generic",
        }
    }
}

const REDACTED: &str = "***";

#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderConfig {
    Cloudflare {
        zone_id: String,
        api_token: String,
        account_hash: String,
        delivery_base: String,
    },
    CloudFront {
        distribution_id: String,
        bucket: String,
        region: String,
        delivery_base: String,
        #[serde(default)]
        access_key_id: Option<String>,
        #[serde(default)]
        secret_access_key: Option<String>,
    },
    Fastly {
        service_id: String,
        api_key: String,
        delivery_base: String,
    },
    Bunny {
        storage_zone: String,
        access_key: String,
        pull_zone: String,
    },
    Generic {
        endpoint: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        delivery_base: Option<String>,
    },
}

impl ProviderConfig {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Cloudflare { .. } => ProviderKind::Cloudflare,
            Self::CloudFront { .. } => ProviderKind::CloudFront,
            Self::Fastly { .. } => ProviderKind::Fastly,
            Self::Bunny { .. } => ProviderKind::Bunny,
            Self::Generic { .. } => ProviderKind::Generic,
        }
    }

    /// Copy with every credential replaced, safe to return from the API
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        match &mut copy {
            Self::Cloudflare { api_token, .. } => *api_token = REDACTED.into(),
            Self::CloudFront {
                access_key_id,
                secret_access_key,
                ..
            } => {
                *access_key_id = access_key_id.as_ref().map(|_| REDACTED.into());
                *secret_access_key = secret_access_key.as_ref().map(|_| REDACTED.into());
            }
            Self::Fastly { api_key, .. } => *api_key = REDACTED.into(),
            Self::Bunny { access_key, .. } => *access_key = REDACTED.into(),
            Self::Generic { api_key, .. } => *api_key = api_key.as_ref().map(|_| REDACTED.into()),
        }
        copy
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub image_optimization: bool,
    #[serde(default)]
    pub video_streaming: bool,
    #[serde(default = "default_true")]
    pub purge: bool,
    #[serde(default)]
    pub purge_by_tag: bool,
    #[serde(default)]
    pub purge_by_pattern: bool,
    /// Compression formats served (e.g. "gzip", "br")
    #[serde(default)]
    pub compression: Vec<String>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            image_optimization: false,
            video_streaming: false,
            purge: true,
            purge_by_tag: false,
            purge_by_pattern: false,
            compression: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Pricing {
    #[serde(default)]
    pub cost_per_gb: f64,
    #[serde(default)]
    pub cost_per_request: f64,
    #[serde(default)]
    pub free_quota_gb: f64,
}

/// Optional per-provider overrides of the operation deadlines
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderTimeouts {
    #[serde(default)]
    pub upload_secs: Option<u64>,
    #[serde(default)]
    pub purge_secs: Option<u64>,
    #[serde(default)]
    pub probe_secs: Option<u64>,
}

impl ProviderTimeouts {
    pub fn upload_or(&self, default: Duration) -> Duration {
        self.upload_secs.map(Duration::from_secs).unwrap_or(default)
    }

    pub fn purge_or(&self, default: Duration) -> Duration {
        self.purge_secs.map(Duration::from_secs).unwrap_or(default)
    }

    pub fn probe_or(&self, default: Duration) -> Duration {
        self.probe_secs.map(Duration::from_secs).unwrap_or(default)
    }
}

/// A configured edge-delivery backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDefinition {
    pub id: String,
    pub name: String,
    pub config: ProviderConfig,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lower is preferred
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub pricing: Pricing,
    #[serde(default)]
    pub timeouts: ProviderTimeouts,
}

impl ProviderDefinition {
    pub fn kind(&self) -> ProviderKind {
        self.config.kind()
    }

    pub fn serves_any_region(&self, regions: &[String]) -> bool {
        self.regions
            .iter()
            .any(|r| regions.iter().any(|wanted| wanted.eq_ignore_ascii_case(r)))
    }

    pub fn redacted(&self) -> Self {
        Self {
            config: self.config.redacted(),
            ..self.clone()
        }
    }
}

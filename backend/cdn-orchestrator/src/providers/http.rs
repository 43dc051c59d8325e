/// reqwest-backed provider client
///
/// Speaks a minimal REST contract against a kind-specific API base:
/// `PUT {api}/files/{file_id}/{filename}`, `POST {api}/purge`,
/// `GET {api}/health`. Provider kinds differ only in base URL, auth header
/// and delivery host.
use super::client::{
    ProviderClient, ProviderClientFactory, PurgeRequest, UploadReceipt, UploadRequest,
};
use crate::error::{CdnError, ProviderError};
use crate::models::{ProviderConfig, ProviderDefinition};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, ETAG};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

const HTTP_CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct HttpProviderClient {
    provider_id: String,
    api_base: Url,
    delivery_base: Url,
    auth: Option<(&'static str, String)>,
    http: reqwest::Client,
    /// Transport deadline configured on `http`
    request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct UploadResponseBody {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    etag: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

fn parse_url(raw: &str) -> Result<Url, CdnError> {
    Url::parse(raw).map_err(|e| CdnError::Config(format!("Invalid provider URL {}: {}", raw, e)))
}

fn with_segments(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

impl HttpProviderClient {
    pub fn from_definition(
        definition: &ProviderDefinition,
        http: reqwest::Client,
        request_timeout: Duration,
    ) -> Result<Self, CdnError> {
        let (api_base, delivery_base, auth) = match &definition.config {
            ProviderConfig::Cloudflare {
                zone_id,
                api_token,
                account_hash,
                delivery_base,
            } => (
                format!("https://api.cloudflare.com/client/v4/zones/{}", zone_id),
                format!("{}/{}", delivery_base.trim_end_matches('/'), account_hash),
                Some(("Authorization", format!("Bearer {}", api_token))),
            ),
            ProviderConfig::CloudFront {
                bucket,
                region,
                delivery_base,
                access_key_id,
                ..
            } => (
                format!("https://{}.s3.{}.amazonaws.com", bucket, region),
                delivery_base.clone(),
                access_key_id
                    .as_ref()
                    .map(|key| ("X-Amz-Access-Key", key.clone())),
            ),
            ProviderConfig::Fastly {
                service_id,
                api_key,
                delivery_base,
            } => (
                format!("https://api.fastly.com/service/{}", service_id),
                delivery_base.clone(),
                Some(("Fastly-Key", api_key.clone())),
            ),
            ProviderConfig::Bunny {
                storage_zone,
                access_key,
                pull_zone,
            } => (
                format!("https://storage.bunnycdn.com/{}", storage_zone),
                format!("https://{}", pull_zone.trim_start_matches("https://")),
                Some(("AccessKey", access_key.clone())),
            ),
            ProviderConfig::Generic {
                endpoint,
                api_key,
                delivery_base,
            } => (
                endpoint.clone(),
                delivery_base.clone().unwrap_or_else(|| endpoint.clone()),
                api_key
                    .as_ref()
                    .map(|key| ("Authorization", format!("Bearer {}", key))),
            ),
        };

        Ok(Self {
            provider_id: definition.id.clone(),
            api_base: parse_url(&api_base)?,
            delivery_base: parse_url(&delivery_base)?,
            auth,
            http,
            request_timeout,
        })
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.auth {
            Some((name, value)) => builder.header(*name, value),
            None => builder,
        }
    }

    /// Public delivery URL for a stored object
    pub fn delivery_url(&self, request: &UploadRequest) -> String {
        let file_id = request.file_id.to_string();
        with_segments(&self.delivery_base, &[&file_id, &request.filename]).to_string()
    }

    fn transport_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.request_timeout)
        } else {
            ProviderError::Http(err.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn upload(&self, request: &UploadRequest) -> Result<UploadReceipt, ProviderError> {
        let file_id = request.file_id.to_string();
        let url = with_segments(&self.api_base, &["files", &file_id, &request.filename]);

        debug!(provider_id = %self.provider_id, %url, "Uploading object");

        let response = self
            .request(reqwest::Method::PUT, url)
            .header(CONTENT_TYPE, request.mime_type.as_str())
            .body(request.data.as_ref().clone())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = Self::check_status(response).await?;

        let header_etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim_matches('"').to_string());

        // Body is optional; providers that answer with an empty 2xx get defaults
        let body: Option<UploadResponseBody> = response.json().await.ok();
        let (url, etag, metadata) = match body {
            Some(body) => (body.url, body.etag.or(header_etag), body.metadata),
            None => (None, header_etag, HashMap::new()),
        };

        Ok(UploadReceipt {
            url: url.unwrap_or_else(|| self.delivery_url(request)),
            etag,
            metadata,
        })
    }

    async fn purge(&self, request: &PurgeRequest) -> Result<(), ProviderError> {
        let url = with_segments(&self.api_base, &["purge"]);
        let body = serde_json::json!({
            "files": request.file_ids,
            "tags": request.tags,
            "patterns": request.patterns,
        });

        let response = self
            .request(reqwest::Method::POST, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn health_probe(&self) -> Result<Duration, ProviderError> {
        let url = with_segments(&self.api_base, &["health"]);
        let started = Instant::now();
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        Self::check_status(response).await?;
        Ok(started.elapsed())
    }
}

/// Default factory building [`HttpProviderClient`]s over one shared pool
#[derive(Clone)]
pub struct HttpClientFactory {
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpClientFactory {
    pub fn new() -> Result<Self, CdnError> {
        Self::with_timeout(HTTP_CLIENT_TIMEOUT)
    }

    pub fn with_timeout(request_timeout: Duration) -> Result<Self, CdnError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CdnError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            request_timeout,
        })
    }
}

impl ProviderClientFactory for HttpClientFactory {
    fn build(&self, definition: &ProviderDefinition) -> Result<Arc<dyn ProviderClient>, CdnError> {
        let client = HttpProviderClient::from_definition(
            definition,
            self.http.clone(),
            self.request_timeout,
        )?;
        Ok(Arc::new(client))
    }
}

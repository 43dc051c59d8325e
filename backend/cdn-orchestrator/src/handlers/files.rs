use crate::error::{CdnError, ErrorResponse, Result};
use crate::orchestrator::CdnOrchestrator;
use crate::services::{
    CropMode, ImageFormat, OptimizationPriority, RouteRequest, UploadOptions, UrlOptions,
};
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: String,
    pub user_id: String,
    pub mime_type: Option<String>,
    pub priority: Option<String>,
    /// Comma-separated region tags
    pub regions: Option<String>,
    /// Comma-separated tags
    pub tags: Option<String>,
    #[serde(default)]
    pub force_refresh: bool,
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Distribute the raw request body across providers
pub async fn upload_file(
    orchestrator: web::Data<CdnOrchestrator>,
    req: HttpRequest,
    query: web::Query<UploadQuery>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let mime_type = query
        .mime_type
        .clone()
        .or_else(|| {
            req.headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

    let options = UploadOptions {
        regions: split_list(query.regions.as_deref()),
        priority: query
            .priority
            .as_deref()
            .map(str::parse::<OptimizationPriority>)
            .transpose()?,
        tags: split_list(query.tags.as_deref()),
        force_refresh: query.force_refresh,
    };

    let file = orchestrator
        .upload_to_cdn(body.to_vec(), &query.filename, &mime_type, &query.user_id, options)
        .await?;

    Ok(HttpResponse::Created().json(file))
}

fn parse_file_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| CdnError::Validation(format!("Invalid file id: {}", raw)))
}

pub async fn get_file(
    orchestrator: web::Data<CdnOrchestrator>,
    file_id: web::Path<String>,
) -> Result<HttpResponse> {
    let file_id = parse_file_id(&file_id)?;
    Ok(HttpResponse::Ok().json(orchestrator.get_file(&file_id)?))
}

#[derive(Debug, Deserialize)]
pub struct UrlQuery {
    pub format: Option<String>,
    pub quality: Option<u8>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub dpr: Option<f32>,
    pub crop: Option<String>,
    /// Preferred provider id
    pub provider: Option<String>,
    /// Client IP override; defaults to the peer address
    pub ip: Option<String>,
}

/// Resolve the best delivery URL for a file
pub async fn get_file_url(
    orchestrator: web::Data<CdnOrchestrator>,
    req: HttpRequest,
    file_id: web::Path<String>,
    query: web::Query<UrlQuery>,
) -> Result<HttpResponse> {
    let file_id = parse_file_id(&file_id)?;
    let query = query.into_inner();

    let options = UrlOptions {
        format: query
            .format
            .as_deref()
            .map(str::parse::<ImageFormat>)
            .transpose()?,
        quality: query.quality,
        width: query.width,
        height: query.height,
        dpr: query.dpr,
        crop: query.crop.as_deref().map(str::parse::<CropMode>).transpose()?,
    };

    let client_ip = query.ip.or_else(|| {
        req.connection_info()
            .realip_remote_addr()
            .map(|addr| strip_port(addr).to_string())
    });
    let accept = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let routed = orchestrator
        .get_cdn_url(RouteRequest {
            file_id,
            location: None,
            client_ip,
            options,
            preferred_provider: query.provider,
            accept,
        })
        .await?;

    match routed {
        Some(routed) => Ok(HttpResponse::Ok().json(routed)),
        None => Ok(HttpResponse::NotFound().json(ErrorResponse {
            error: format!("File {} has no cached copy on any provider", file_id),
            code: "NOT_SERVABLE",
            status: 404,
            failures: None,
        })),
    }
}

/// `1.2.3.4:5678` -> `1.2.3.4`; bracketed IPv6 keeps only the address
fn strip_port(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match addr.rsplit_once(':') {
        // A bare IPv6 address has several colons and no port
        Some((host, _)) if !host.contains(':') => host,
        _ => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(Some(" eu-west, ,us-east ")), vec!["eu-west", "us-east"]);
        assert!(split_list(None).is_empty());
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("203.0.113.9:443"), "203.0.113.9");
        assert_eq!(strip_port("203.0.113.9"), "203.0.113.9");
        assert_eq!(strip_port("[2001:db8::1]:8080"), "2001:db8::1");
        assert_eq!(strip_port("2001:db8::1"), "2001:db8::1");
    }
}

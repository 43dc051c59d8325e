use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CdnError>;

/// Failure reported by a single provider client call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider rejected request: {0}")]
    Rejected(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

/// One provider's failed attempt, kept for structured reporting
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProviderFailure {
    pub provider_id: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum CdnError {
    #[error("No healthy providers available")]
    NoHealthyProviders,

    #[error("Upload to provider {provider_id} failed: {reason}")]
    ProviderUploadFailed { provider_id: String, reason: String },

    #[error("Upload failed on every selected provider ({} attempted)", .failures.len())]
    DistributionFailed { failures: Vec<ProviderFailure> },

    #[error("Purge on provider {provider_id} failed: {reason}")]
    ProviderPurgeFailed { provider_id: String, reason: String },

    #[error("Circuit breaker open for provider {0}")]
    CircuitBreakerOpen(String),

    #[error("Geolocation unavailable: {0}")]
    GeolocationUnavailable(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Provider already registered: {0}")]
    ProviderAlreadyExists(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CdnError {
    fn code(&self) -> &'static str {
        match self {
            CdnError::NoHealthyProviders => "NO_HEALTHY_PROVIDERS",
            CdnError::ProviderUploadFailed { .. } => "PROVIDER_UPLOAD_FAILED",
            CdnError::DistributionFailed { .. } => "DISTRIBUTION_FAILED",
            CdnError::ProviderPurgeFailed { .. } => "PROVIDER_PURGE_FAILED",
            CdnError::CircuitBreakerOpen(_) => "CIRCUIT_BREAKER_OPEN",
            CdnError::GeolocationUnavailable(_) => "GEOLOCATION_UNAVAILABLE",
            CdnError::FileNotFound(_) => "FILE_NOT_FOUND",
            CdnError::ProviderNotFound(_) => "PROVIDER_NOT_FOUND",
            CdnError::ProviderAlreadyExists(_) => "PROVIDER_ALREADY_EXISTS",
            CdnError::Validation(_) => "VALIDATION_ERROR",
            CdnError::Config(_) => "CONFIG_ERROR",
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures: Option<Vec<ProviderFailure>>,
}

impl ResponseError for CdnError {
    fn status_code(&self) -> StatusCode {
        match self {
            CdnError::FileNotFound(_) | CdnError::ProviderNotFound(_) => StatusCode::NOT_FOUND,
            CdnError::Validation(_) => StatusCode::BAD_REQUEST,
            CdnError::ProviderAlreadyExists(_) => StatusCode::CONFLICT,
            CdnError::NoHealthyProviders
            | CdnError::DistributionFailed { .. }
            | CdnError::CircuitBreakerOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let failures = match self {
            CdnError::DistributionFailed { failures } => Some(failures.clone()),
            _ => None,
        };

        HttpResponse::build(status).json(ErrorResponse {
            error: self.to_string(),
            code: self.code(),
            status: status.as_u16(),
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            CdnError::FileNotFound("f".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CdnError::NoHealthyProviders.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            CdnError::ProviderAlreadyExists("p".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            CdnError::Config("bad".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_distribution_failed_message_counts_attempts() {
        let err = CdnError::DistributionFailed {
            failures: vec![
                ProviderFailure {
                    provider_id: "a".into(),
                    reason: "timeout".into(),
                },
                ProviderFailure {
                    provider_id: "b".into(),
                    reason: "503".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "Upload failed on every selected provider (2 attempted)"
        );
    }
}

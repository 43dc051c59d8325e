use crate::error::Result;
use crate::orchestrator::CdnOrchestrator;
use actix_web::{web, HttpResponse};
use tracing::info;

/// Definitions with credentials redacted, plus health snapshots
pub async fn list_providers(orchestrator: web::Data<CdnOrchestrator>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(orchestrator.providers()))
}

pub async fn enable_provider(
    orchestrator: web::Data<CdnOrchestrator>,
    provider_id: web::Path<String>,
) -> Result<HttpResponse> {
    orchestrator.set_provider_enabled(&provider_id, true)?;
    info!(provider_id = %provider_id, "Provider enabled via API");
    Ok(HttpResponse::Ok().json(orchestrator.provider_health(&provider_id)?))
}

pub async fn disable_provider(
    orchestrator: web::Data<CdnOrchestrator>,
    provider_id: web::Path<String>,
) -> Result<HttpResponse> {
    orchestrator.set_provider_enabled(&provider_id, false)?;
    info!(provider_id = %provider_id, "Provider disabled via API");
    Ok(HttpResponse::NoContent().finish())
}

use crate::error::Result;
use crate::orchestrator::CdnOrchestrator;
use crate::providers::PurgeRequest;
use actix_web::{web, HttpResponse};

/// Fan a purge out to every healthy provider; always 200 with per-provider results
pub async fn purge_content(
    orchestrator: web::Data<CdnOrchestrator>,
    payload: web::Json<PurgeRequest>,
) -> Result<HttpResponse> {
    let report = orchestrator.purge_content(payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(report))
}

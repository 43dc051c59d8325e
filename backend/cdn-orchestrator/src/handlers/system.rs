use crate::error::Result;
use crate::orchestrator::CdnOrchestrator;
use actix_web::{web, HttpResponse};
use tracing::error;

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

pub async fn metrics() -> HttpResponse {
    match crate::metrics::render() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// Aggregate status from measured counters
pub async fn status(orchestrator: web::Data<CdnOrchestrator>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(orchestrator.get_system_status()))
}
